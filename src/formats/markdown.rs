use super::Format;
use crate::counters::CounterReading;
use std::{
    error::Error,
    io::{Write, stdout},
    mem,
    time::SystemTime,
};
use tabled::settings::Style;

struct Row {
    scale: usize,
    labels: Vec<String>,
    readings: Vec<CounterReading>,
}

/// A markdown table of all dispatches, printed when the sweep ends.
pub struct Markdown {
    rows: Vec<Row>,
    writer: Box<dyn Write>,
}

impl Markdown {
    pub fn new() -> Self {
        Self::with_writer(Box::new(stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Markdown {
            rows: Vec::new(),
            writer,
        }
    }
}

impl Format for Markdown {
    fn push(
        &mut self,
        scale: usize,
        _start_time: SystemTime,
        _counter_names: &[String],
        readings: &[CounterReading],
        labels: &mut dyn FnMut(&mut dyn FnMut(&str)),
        _label_names: &'static [&'static str],
    ) -> Result<(), Box<dyn Error>> {
        let mut label_vec = Vec::new();
        labels(&mut |l: &str| label_vec.push(l.to_string()));
        self.rows.push(Row {
            scale,
            labels: label_vec,
            readings: readings.to_vec(),
        });
        Ok(())
    }

    fn dump_and_reset(
        &mut self,
        label_names: &'static [&'static str],
        counter_names: &[String],
    ) -> Result<(), Box<dyn Error>> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let rows = mem::take(&mut self.rows);
        let mut table = tabled::builder::Builder::new();
        table.push_record(
            label_names
                .iter()
                .map(|x| x.to_string())
                .chain(counter_names.iter().cloned()),
        );
        for row in &rows {
            table.push_record(
                row.labels.iter().cloned().chain(
                    row.readings
                        .iter()
                        .map(|x| format!("{:3.3}", x.scaled_value(row.scale))),
                ),
            );
        }
        let any_multiplexed = rows.iter().flat_map(|x| &x.readings).any(|x| x.multiplexed);
        let multiplex_warning = if any_multiplexed {
            "⚠️ Some counters were multiplexed.\n"
        } else {
            "\n"
        };
        let mut table = table.build();
        table.with(Style::markdown());
        writeln!(self.writer, "{multiplex_warning}{table}")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[test]
fn test_markdown_table() {
    use super::{SharedBuf, fixture};
    let out = SharedBuf::default();
    let mut md = Markdown::with_writer(Box::new(out.clone()));
    let names = fixture::counter_names();
    md.dump_and_reset(fixture::LABELS, &names).unwrap();
    assert!(out.contents().is_empty(), "empty sweep printed a table");
    for size in ["1024", "2048"] {
        md.push(
            size.parse().unwrap(),
            SystemTime::now(),
            &names,
            &fixture::readings(1.5),
            &mut fixture::labels(&[size, "ok"]),
            fixture::LABELS,
        )
        .unwrap();
    }
    md.dump_and_reset(fixture::LABELS, &names).unwrap();
    let text = out.contents();
    let lines: Vec<&str> = text.lines().filter(|l| l.starts_with('|')).collect();
    assert_eq!(lines.len(), 4, "{text}");
    assert!(lines[0].contains("size") && lines[0].contains("ns/acc"), "{text}");
    assert!(lines[2].contains("1024") && lines[2].contains("1464.844"), "{text}");
    assert!(lines[3].contains("2048") && lines[3].contains("732.422"), "{text}");
}
