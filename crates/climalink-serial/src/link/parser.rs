//! Telemetry chunk parser.
//!
//! The board prints lines like `T25.5 H60`.  Each marker is matched on its
//! own, so a chunk may update one field, both, or neither.

use crate::link::display::{DisplayEvent, DisplaySink};
use crate::link::types::{Measurement, TelemetryReading};
use regex::Regex;

lazy_static::lazy_static! {
    static ref TEMPERATURE: Regex = Regex::new(r"T([0-9]+(?:\.[0-9]*)?|\.[0-9]+)").unwrap();
    static ref HUMIDITY: Regex = Regex::new(r"H([0-9]+(?:\.[0-9]*)?|\.[0-9]+)").unwrap();
}

/// Extract temperature and humidity from a trimmed chunk.
pub fn parse_chunk(chunk: &str) -> TelemetryReading {
    TelemetryReading {
        temperature: find_measurement(&TEMPERATURE, chunk),
        humidity: find_measurement(&HUMIDITY, chunk),
    }
}

/// First occurrence whose digits parse as a number.
fn find_measurement(re: &Regex, chunk: &str) -> Option<Measurement> {
    re.captures_iter(chunk).find_map(|caps| {
        let raw = caps.get(1)?.as_str();
        let value = raw.parse::<f64>().ok()?;
        Some(Measurement {
            raw: raw.to_string(),
            value,
        })
    })
}

/// Push the fields present in `reading` to the display.
pub fn report(reading: &TelemetryReading, sink: &dyn DisplaySink) {
    if let Some(t) = &reading.temperature {
        sink.emit(DisplayEvent::Temperature(t.raw.clone()));
    }
    if let Some(h) = &reading.humidity {
        sink.emit(DisplayEvent::Humidity(h.raw.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::display::RecordingSink;

    #[test]
    fn test_temperature_only() {
        let r = parse_chunk("T12.5");
        assert_eq!(r.temperature.as_ref().unwrap().value, 12.5);
        assert_eq!(r.temperature.unwrap().raw, "12.5");
        assert!(r.humidity.is_none());
    }

    #[test]
    fn test_both_fields_any_order() {
        for chunk in ["T20 H55.2", "H55.2 T20", "  T20    H55.2  ", "H55.2\nT20"] {
            let r = parse_chunk(chunk.trim());
            assert_eq!(r.temperature.as_ref().unwrap().raw, "20", "chunk {:?}", chunk);
            assert_eq!(r.humidity.as_ref().unwrap().raw, "55.2", "chunk {:?}", chunk);
        }
    }

    #[test]
    fn test_no_markers() {
        assert!(parse_chunk("hello board").is_empty());
        assert!(parse_chunk("").is_empty());
    }

    #[test]
    fn test_malformed_number_is_no_match() {
        assert!(parse_chunk("T. Hx").is_empty());
        let r = parse_chunk("T.. H40");
        assert!(r.temperature.is_none());
        assert_eq!(r.humidity.unwrap().value, 40.0);
    }

    #[test]
    fn test_first_valid_occurrence_wins() {
        let r = parse_chunk("Tx T21.0 T22");
        assert_eq!(r.temperature.unwrap().raw, "21.0");
    }

    #[test]
    fn test_leading_dot_and_trailing_dot() {
        assert_eq!(parse_chunk("T.5").temperature.unwrap().value, 0.5);
        let r = parse_chunk("T25. H60");
        assert_eq!(r.temperature.as_ref().unwrap().raw, "25.");
        assert_eq!(r.temperature.unwrap().value, 25.0);
        assert_eq!(parse_chunk("T1.2.3").temperature.unwrap().raw, "1.2");
    }

    #[test]
    fn test_only_ascii_digits() {
        assert!(parse_chunk("T\u{0663}").temperature.is_none());
        let r = parse_chunk("T\u{0663} T21 H\u{0664}0 H45");
        assert_eq!(r.temperature.unwrap().raw, "21");
        assert_eq!(r.humidity.unwrap().raw, "45");
    }

    #[test]
    fn test_report_only_present_fields() {
        let sink = RecordingSink::new();
        report(&parse_chunk("T25.5 H60"), &sink);
        report(&parse_chunk("H61"), &sink);
        report(&parse_chunk("noise"), &sink);

        let state = sink.state();
        assert_eq!(state.temperature.as_deref(), Some("25.5"));
        assert_eq!(state.humidity.as_deref(), Some("61"));
        assert_eq!(sink.events().len(), 3);
    }
}
