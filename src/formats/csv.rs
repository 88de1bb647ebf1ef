use super::Format;
use crate::counters::CounterReading;
use std::{
    error::Error,
    io::{Write, stdout},
    iter,
    time::{SystemTime, UNIX_EPOCH},
};

/// One CSV row per dispatch, preceded by a header row.
pub struct Csv {
    header_written: bool,
    writer: csv::Writer<Box<dyn Write>>,
}

impl Csv {
    pub fn new() -> Self {
        Self::with_writer(Box::new(stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Csv {
            header_written: false,
            writer: csv::Writer::from_writer(writer),
        }
    }
}

impl Format for Csv {
    fn push(
        &mut self,
        scale: usize,
        start_time: SystemTime,
        counter_names: &[String],
        readings: &[CounterReading],
        labels: &mut dyn FnMut(&mut dyn FnMut(&str)),
        label_names: &'static [&'static str],
    ) -> Result<(), Box<dyn Error>> {
        if !self.header_written {
            self.header_written = true;
            for name in label_names {
                self.writer.write_field(name)?;
            }
            self.writer.write_field("start_time")?;
            self.writer.write_field("scale")?;
            for name in counter_names {
                self.writer.write_field(name)?;
            }
            self.writer.write_field("multiplexed")?;
            self.writer.write_record(iter::empty::<&[u8]>())?;
        }
        let mut err = Ok(());
        labels(&mut |x| {
            if err.is_ok() {
                err = self.writer.write_field(x)
            }
        });
        err?;
        self.writer.write_field(
            start_time
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64()
                .to_string(),
        )?;
        self.writer.write_field(scale.to_string())?;
        let mut any_multiplexed = false;
        for reading in readings {
            any_multiplexed |= reading.multiplexed;
            self.writer
                .write_field(reading.scaled_value(scale).to_string())?;
        }
        self.writer.write_field(any_multiplexed.to_string())?;
        self.writer.write_record(iter::empty::<&[u8]>())?;
        self.writer.flush()?;
        Ok(())
    }

    fn dump_and_reset(
        &mut self,
        _label_names: &'static [&'static str],
        _counter_names: &[String],
    ) -> Result<(), Box<dyn Error>> {
        self.header_written = false;
        self.writer.flush()?;
        Ok(())
    }
}

#[test]
fn test_csv_rows() {
    use super::{SharedBuf, fixture};
    let out = SharedBuf::default();
    let mut csv = Csv::with_writer(Box::new(out.clone()));
    let names = fixture::counter_names();
    for (size, ms) in [("1024", 0.5), ("2048", 1.0)] {
        csv.push(
            size.parse().unwrap(),
            UNIX_EPOCH,
            &names,
            &fixture::readings(ms),
            &mut fixture::labels(&[size, "ok"]),
            fixture::LABELS,
        )
        .unwrap();
    }
    csv.dump_and_reset(fixture::LABELS, &names).unwrap();
    let text = out.contents();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        [
            "size,verdict,start_time,scale,ms,ns/acc,multiplexed",
            "1024,ok,0,1024,0.5,488.28125,false",
            "2048,ok,0,2048,1,488.28125,false",
        ]
    );
}
