use time::{macros::format_description, Date};

/// Number of header lines before the data in a 10-minute file.
pub const HEADER_LINES: usize = 2;

/// Whitespace-separated fields of one 10-minute observation line:
/// year, julian day, month, day, hhmm, then the six sensor channels.
/// Validated against real upstream samples; the julian day is carried
/// by the format but redundant with the month/day fields.
pub const MIN_FIELDS: usize = 11;

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year][month][day]");

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("expected at least {MIN_FIELDS} fields, found {found}")]
    FieldCount { found: usize },
    #[error("invalid calendar date '{0}'")]
    Date(String),
    #[error("invalid time of day '{0}'")]
    Time(String),
    #[error("non-numeric sensor field '{0}'")]
    Sensor(String),
}

/// One parsed observation line, normalized for the store.
/// The station name is injected by the caller; the line does not carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    /// temperature, pressure, wind_speed, wind_direction, humidity, delta_t
    pub channels: [f64; 6],
}

/// Parse one data line of a 10-minute observation file.
///
/// A malformed line is an error for this line only; callers count and
/// skip it rather than aborting the file.
pub fn parse_line(line: &str) -> Result<ParsedRecord, MalformedRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return Err(MalformedRecord::FieldCount {
            found: fields.len(),
        });
    }

    let date = compose_date(fields[0], fields[2], fields[3])?;
    let time = compose_time(fields[4])?;

    let mut channels = [0.0; 6];
    for (slot, field) in channels.iter_mut().zip(&fields[5..11]) {
        *slot = field
            .parse::<f64>()
            .map_err(|_| MalformedRecord::Sensor((*field).to_owned()))?;
    }

    Ok(ParsedRecord {
        date,
        time,
        channels,
    })
}

/// Compose the separate year/month/day fields into an 8-digit string
/// and insist it is a real calendar date.
fn compose_date(year: &str, month: &str, day: &str) -> Result<String, MalformedRecord> {
    let composed = format!("{:0>4}{:0>2}{:0>2}", year, month, day);
    let bad = || MalformedRecord::Date(format!("{} {} {}", year, month, day));

    if composed.len() != 8 || !composed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let parsed = Date::parse(&composed, DATE_FORMAT).map_err(|_| bad())?;

    Ok(format!(
        "{:04}-{:02}-{:02}",
        parsed.year(),
        parsed.month() as u8,
        parsed.day()
    ))
}

fn compose_time(hhmm: &str) -> Result<String, MalformedRecord> {
    let padded = format!("{:0>4}", hhmm);
    let bad = || MalformedRecord::Time(hhmm.to_owned());

    if padded.len() != 4 || !padded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let hour: u8 = padded[..2].parse().map_err(|_| bad())?;
    let minute: u8 = padded[2..].parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }

    Ok(format!("{:02}:{:02}", hour, minute))
}
