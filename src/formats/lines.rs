use super::Format;
use crate::counters::CounterReading;
use std::{
    error::Error,
    io::{Write, stdout},
    time::SystemTime,
};

/// One `name=value` line per dispatch, written as soon as the dispatch is recorded.
pub struct Lines {
    writer: Box<dyn Write>,
}

impl Lines {
    pub fn new() -> Self {
        Self::with_writer(Box::new(stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Lines { writer }
    }
}

impl Format for Lines {
    fn push(
        &mut self,
        scale: usize,
        _start_time: SystemTime,
        counter_names: &[String],
        readings: &[CounterReading],
        labels: &mut dyn FnMut(&mut dyn FnMut(&str)),
        label_names: &'static [&'static str],
    ) -> Result<(), Box<dyn Error>> {
        let mut fields = Vec::with_capacity(label_names.len() + readings.len());
        let mut names = label_names.iter();
        labels(&mut |value| {
            if let Some(name) = names.next() {
                fields.push(format!("{name}={value}"));
            }
        });
        let mut multiplexed = false;
        for (name, reading) in counter_names.iter().zip(readings) {
            multiplexed |= reading.multiplexed;
            fields.push(format!("{name}={:.3}", reading.scaled_value(scale)));
        }
        if multiplexed {
            fields.push("⚠️ multiplexed".to_string());
        }
        writeln!(self.writer, "{}", fields.join("  "))?;
        self.writer.flush()?;
        Ok(())
    }

    fn dump_and_reset(
        &mut self,
        _label_names: &'static [&'static str],
        _counter_names: &[String],
    ) -> Result<(), Box<dyn Error>> {
        self.writer.flush()?;
        Ok(())
    }
}

#[test]
fn test_lines() {
    use super::{SharedBuf, fixture};
    let out = SharedBuf::default();
    let mut lines = Lines::with_writer(Box::new(out.clone()));
    let names = fixture::counter_names();
    lines
        .push(
            4096,
            SystemTime::now(),
            &names,
            &fixture::readings(2.048),
            &mut fixture::labels(&["4096", "MISMATCH"]),
            fixture::LABELS,
        )
        .unwrap();
    assert_eq!(
        out.contents(),
        "size=4096  verdict=MISMATCH  ms=2.048  ns/acc=500.000\n"
    );
}
