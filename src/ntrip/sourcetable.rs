//! NTRIP sourcetable parsing (§4.9): `STR;...`/`CAS;...`/`NET;...` records,
//! terminated by `ENDSOURCETABLE`.

/// Stream format, resolved from the caster's free-text format field via a
/// longest-prefix match (§4.9: "mapped to an enum via a longest-prefix
/// table").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Rtcm2,
    Rtcm3,
    Rtcm32,
    Other,
}

const FORMAT_TABLE: &[(&str, StreamFormat)] = &[
    ("RTCM 3.2", StreamFormat::Rtcm32),
    ("RTCM3.2", StreamFormat::Rtcm32),
    ("RTCM32", StreamFormat::Rtcm32),
    ("RTCM 3", StreamFormat::Rtcm3),
    ("RTCM3", StreamFormat::Rtcm3),
    ("RTCM 2", StreamFormat::Rtcm2),
    ("RTCM2", StreamFormat::Rtcm2),
];

fn resolve_format(raw: &str) -> StreamFormat {
    FORMAT_TABLE
        .iter()
        .filter(|(prefix, _)| raw.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, fmt)| *fmt)
        .unwrap_or(StreamFormat::Other)
}

/// One `STR` record: the fields a client needs to select and connect to a
/// mountpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub mountpoint: String,
    pub identifier: String,
    pub format: StreamFormat,
    pub format_details: String,
    pub carrier: String,
    pub nav_system: String,
    pub country: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub nmea_required: bool,
    pub solution: String,
    pub generator: String,
    pub compr_encryp: String,
    pub authentication: String,
    pub fee: bool,
    pub bitrate: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Sourcetable {
    pub streams: Vec<StreamRecord>,
}

/// Splits a sourcetable record line on `;`, respecting quoted fields (a
/// `;` inside a matching pair of `"` does not end a field) per §4.9.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

pub fn parse(body: &str) -> Sourcetable {
    let mut table = Sourcetable::default();
    for line in body.lines() {
        if line == "ENDSOURCETABLE" {
            break;
        }
        let Some(rest) = line.strip_prefix("STR;") else {
            continue;
        };
        let f = split_fields(rest);
        if f.len() < 15 {
            continue;
        }
        table.streams.push(StreamRecord {
            mountpoint: f[0].to_string(),
            identifier: f[1].to_string(),
            format: resolve_format(f[2]),
            format_details: f[3].to_string(),
            carrier: f[4].to_string(),
            nav_system: f[5].to_string(),
            country: f[6].to_string(),
            lat: f[7].parse().ok(),
            lon: f[8].parse().ok(),
            nmea_required: f[9] == "1",
            solution: f[10].to_string(),
            generator: f[11].to_string(),
            compr_encryp: f[12].to_string(),
            authentication: f[13].to_string(),
            fee: f[14] == "Y",
            bitrate: f.get(15).and_then(|s| s.parse().ok()),
        });
    }
    table
}

impl Sourcetable {
    /// The first `STR` record whose mountpoint matches exactly (§4.9:
    /// "the first STR whose mountpoint equals the requested mountpoint").
    pub fn find(&self, mountpoint: &str) -> Option<&StreamRecord> {
        self.streams.iter().find(|s| s.mountpoint == mountpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "SOURCETABLE 200 OK\r\n\
STR;MOUNT;Site One;RTCM 3.2;1004(1),1005(5);2;GPS+GLO;DEU;50.10;8.70;1;0;sNTRIP;none;B;N;9600\r\n\
STR;OTHER;Site Two;RTCM3;1004;2;GPS;DEU;50.00;8.00;0;0;sNTRIP;none;N;N;9600\r\n\
ENDSOURCETABLE\r\n";

    #[test]
    fn parses_str_records_and_skips_others() {
        let body = BODY.split_once("\r\n").unwrap().1;
        let table = parse(body);
        assert_eq!(table.streams.len(), 2);
        assert_eq!(table.streams[0].mountpoint, "MOUNT");
        assert_eq!(table.streams[0].format, StreamFormat::Rtcm32);
    }

    #[test]
    fn find_matches_exact_mountpoint() {
        let body = BODY.split_once("\r\n").unwrap().1;
        let table = parse(body);
        assert!(table.find("MOUNT").is_some());
        assert!(table.find("NOPE").is_none());
    }

    #[test]
    fn quoted_semicolons_do_not_split_fields() {
        let line = r#"a;"b;c";d"#;
        let fields = split_fields(line);
        assert_eq!(fields, vec!["a", "\"b;c\"", "d"]);
    }

    #[test]
    fn stops_at_endsourcetable() {
        let body = "STR;A;i;RTCM3;f;c;n;cc;1;2;1;s;g;ce;a;N;9600\r\nENDSOURCETABLE\r\nSTR;B;i;RTCM3;f;c;n;cc;1;2;1;s;g;ce;a;N;9600\r\n";
        let table = parse(body);
        assert_eq!(table.streams.len(), 1);
    }
}
