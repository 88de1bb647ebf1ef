mod csv;
mod lines;
mod markdown;

pub use csv::Csv;
pub use lines::Lines;
pub use markdown::Markdown;

use crate::counters::CounterReading;
use std::{error::Error, time::SystemTime};

/// A way of writing report rows.
///
/// Each row consists of the label values, in the order of `label_names`, followed by one
/// reading per entry of `counter_names`.
pub trait Format {
    fn push(
        &mut self,
        scale: usize,
        start_time: SystemTime,
        counter_names: &[String],
        readings: &[CounterReading],
        labels: &mut dyn FnMut(&mut dyn FnMut(&str)),
        label_names: &'static [&'static str],
    ) -> Result<(), Box<dyn Error>>;

    /// Flushes anything buffered. Further rows start a new table.
    fn dump_and_reset(
        &mut self,
        label_names: &'static [&'static str],
        counter_names: &[String],
    ) -> Result<(), Box<dyn Error>>;
}

impl Format for Box<dyn Format> {
    fn push(
        &mut self,
        scale: usize,
        start_time: SystemTime,
        counter_names: &[String],
        readings: &[CounterReading],
        labels: &mut dyn FnMut(&mut dyn FnMut(&str)),
        label_names: &'static [&'static str],
    ) -> Result<(), Box<dyn Error>> {
        (**self).push(
            scale,
            start_time,
            counter_names,
            readings,
            labels,
            label_names,
        )
    }

    fn dump_and_reset(
        &mut self,
        label_names: &'static [&'static str],
        counter_names: &[String],
    ) -> Result<(), Box<dyn Error>> {
        (**self).dump_and_reset(label_names, counter_names)
    }
}

/// Selects the output format from `CHASE_FORMAT`.
pub fn format_from_env() -> Box<dyn Format> {
    match std::env::var("CHASE_FORMAT").as_deref() {
        Ok("csv") => Box::new(Csv::new()),
        Ok("md") => Box::new(Markdown::new()),
        Ok("lines") | Err(_) => Box::new(Lines::new()),
        Ok(requested) => {
            eprintln!(
                "unrecognized value for CHASE_FORMAT: {requested:?}.\nSupported values: lines, csv, md"
            );
            Box::new(Lines::new())
        }
    }
}

/// An in-memory writer whose contents stay readable after it is handed to a format.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

#[cfg(test)]
impl SharedBuf {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

#[cfg(test)]
impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::Write::write(&mut *self.0.borrow_mut(), buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::counters::CounterReading;

    pub const LABELS: &[&str] = &["size", "verdict"];

    pub fn counter_names() -> Vec<String> {
        vec!["ms".to_string(), "ns/acc".to_string()]
    }

    /// Readings for a dispatch that took `ms` milliseconds.
    pub fn readings(ms: f64) -> Vec<CounterReading> {
        vec![
            CounterReading {
                value: ms,
                multiplexed: false,
                enable_scale: false,
            },
            CounterReading {
                value: ms * 1e6,
                multiplexed: false,
                enable_scale: true,
            },
        ]
    }

    pub fn labels<'a>(values: &'a [&'a str]) -> impl FnMut(&mut dyn FnMut(&str)) + 'a {
        move |f: &mut dyn FnMut(&str)| {
            for v in values {
                f(*v)
            }
        }
    }
}
