use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// How to split a line of a plain-text table into fields
#[derive(Clone, Debug)]
pub enum Delimiter {
    Str(String),
    Whitespace,
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl Delimiter {
    /// Split a line into trimmed, non-empty-aware fields
    pub fn split<'a>(&'a self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Str(s) => line.split(s.as_str()).map(str::trim).collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Guess a delimiter from the file name: `.csv(.gz)` is comma,
/// `.tsv(.gz)` is tab, anything else is split on whitespace
pub fn detect_delimiter(file_path: &str) -> Delimiter {
    let stem = file_path.strip_suffix(".gz").unwrap_or(file_path);
    if stem.ends_with(".csv") {
        Delimiter::from(",")
    } else if stem.ends_with(".tsv") {
        Delimiter::from("\t")
    } else {
        Delimiter::Whitespace
    }
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines(lines: &[Box<str>], output_file_path: &str) -> anyhow::Result<()> {
    write_types(lines, output_file_path)
}

///
/// Write every displayable item as a line into the output_file
///
/// * `lines` - vector of items
/// * `output_file` - file name--either gzipped or not
///
pub fn write_types<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut<T: Send> {
    pub lines: Vec<Vec<T>>,
    pub header: Vec<Box<str>>,
}

fn is_not_comment_line(line: &str) -> bool {
    !(line.starts_with('#') || line.starts_with('%') || line.trim().is_empty())
}

///
/// Read lines and parse them into a vector of words or types.
/// Comment lines (`#`, `%`) and blank lines are skipped.
///
/// * `input_file` - file name--either gzipped or not
/// * `hdr_line` - location of a header line (-1 = no header line)
/// * `parse_header_fn` - parse the header line into names
/// * `parse_fn` - parse each data line, failing on malformed input
///
pub fn read_lines_of_words_generic<T>(
    input_file: &str,
    hdr_line: i64,
    parse_header_fn: impl Fn(&str) -> Vec<Box<str>> + Sync,
    parse_fn: impl Fn(&str) -> anyhow::Result<Vec<T>> + Sync,
) -> anyhow::Result<ReadLinesOut<T>>
where
    T: Send,
{
    let buf_reader: Box<dyn BufRead> = open_buf_reader(input_file)?;

    let lines_raw: Vec<Box<str>> = buf_reader
        .lines()
        .map_while(Result::ok)
        .map(|x| x.into_boxed_str())
        .filter(|x| is_not_comment_line(x.as_ref()))
        .collect();

    let mut header = vec![];

    let body = if hdr_line < 0 {
        &lines_raw[..]
    } else {
        let n_skip = hdr_line as usize;
        if lines_raw.len() < (n_skip + 1) {
            return Err(anyhow::anyhow!("not enough data in {}", input_file));
        }
        header.extend(parse_header_fn(&lines_raw[n_skip]));
        &lines_raw[(n_skip + 1)..]
    };

    // parsing takes more time, so split them into parallel jobs;
    // collect() on an indexed parallel iterator keeps the order
    let lines = body
        .par_iter()
        .enumerate()
        .map(|(i, s)| {
            parse_fn(s).map_err(|e| anyhow::anyhow!("{}: line {}: {}", input_file, i + 1, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ReadLinesOut { lines, header })
}

///
/// Read lines and split them into words.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - delimiter
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: impl Into<Delimiter>,
    hdr_line: i64,
) -> anyhow::Result<ReadLinesOut<Box<str>>> {
    let delim = delim.into();

    let parse_words = |line: &str| -> Vec<Box<str>> {
        delim
            .split(line)
            .into_iter()
            .map(|x| x.to_owned().into_boxed_str())
            .collect()
    };

    read_lines_of_words_generic(input_file, hdr_line, parse_words, |line| {
        Ok(parse_words(line))
    })
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let input_file = File::open(input_file)?;
            let decoder = GzDecoder::new(input_file);
            Ok(Box::new(BufReader::new(decoder)))
        }
        _ => {
            let input_file = File::open(input_file)?;
            Ok(Box::new(BufReader::new(input_file)))
        }
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn std::io::Write>> {
    // we can simply override with stdout
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(std::io::BufWriter::new(std::io::stdout())));
    }

    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(std::io::BufWriter::new(std::io::stderr())));
    }

    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let output_file = File::create(output_file)?;
            let encoder =
                flate2::write::GzEncoder::new(output_file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => {
            let output_file = File::create(output_file)?;
            Ok(Box::new(BufWriter::new(output_file)))
        }
    }
}

///
/// Create the parent directory of a file if needed
/// * `file` - file name
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert!(matches!(detect_delimiter("a.csv"), Delimiter::Str(s) if s == ","));
        assert!(matches!(detect_delimiter("a.tsv.gz"), Delimiter::Str(s) if s == "\t"));
        assert!(matches!(detect_delimiter("a.txt"), Delimiter::Whitespace));
    }

    #[test]
    fn test_round_trip_gz_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("lines.tsv.gz");
        let file = file.to_str().unwrap();

        let lines: Vec<Box<str>> = vec!["# comment".into(), "A\tB".into(), "B\tC".into()];
        write_lines(&lines, file)?;

        let out = read_lines_of_words_delim(file, "\t", -1)?;
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[0], vec![Box::<str>::from("A"), Box::from("B")]);
        assert_eq!(out.lines[1], vec![Box::<str>::from("B"), Box::from("C")]);
        Ok(())
    }

    #[test]
    fn test_parse_failure_names_line() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("values.tsv");
        let file = file.to_str().unwrap();

        let lines: Vec<Box<str>> = vec!["1\t2".into(), "3\tx".into()];
        write_lines(&lines, file)?;

        let parse = |line: &str| -> anyhow::Result<Vec<f64>> {
            line.split('\t')
                .map(|x| x.parse::<f64>().map_err(anyhow::Error::from))
                .collect()
        };
        let err = read_lines_of_words_generic(file, -1, |_| vec![], parse)
            .err()
            .unwrap();
        assert!(err.to_string().contains("line 2"));
        Ok(())
    }
}
