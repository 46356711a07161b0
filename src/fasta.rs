use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::RefsError;

pub const ALLELE_EXTENSION: &str = "tfa";
pub const RMLST_COMBINED: &str = "rMLST_combined.fasta";
const LINE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub description: String,
    pub sequence: String,
}

impl FastaRecord {
    /// Dashes in the id become underscores; gaps and `N` are dropped from the
    /// sequence; the description is cleared.
    pub fn normalized(&self) -> FastaRecord {
        FastaRecord {
            id: self.id.replace('-', "_"),
            description: String::new(),
            sequence: self
                .sequence
                .chars()
                .filter(|ch| !matches!(ch, '-' | 'N'))
                .collect(),
        }
    }
}

pub struct FastaReader<R: BufRead> {
    lines: std::io::Lines<R>,
    pending: Option<(String, String)>,
    line_no: usize,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pending: None,
            line_no: 0,
        }
    }
}

fn split_header(header: &str) -> (String, String) {
    let header = header.trim();
    match header.split_once(char::is_whitespace) {
        Some((id, rest)) => (id.to_string(), rest.trim().to_string()),
        None => (header.to_string(), String::new()),
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord, RefsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sequence = String::new();
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_no += 1;
                    let line = line.trim_end();
                    if let Some(header) = line.strip_prefix('>') {
                        let next = split_header(header);
                        if let Some((id, description)) = self.pending.replace(next) {
                            return Some(Ok(FastaRecord {
                                id,
                                description,
                                sequence,
                            }));
                        }
                    } else if !line.is_empty() {
                        if self.pending.is_none() {
                            return Some(Err(RefsError::FastaParse(format!(
                                "sequence data before first header at line {}",
                                self.line_no
                            ))));
                        }
                        sequence.push_str(line.trim());
                    }
                }
                Some(Err(err)) => return Some(Err(RefsError::FastaParse(err.to_string()))),
                None => {
                    return self.pending.take().map(|(id, description)| {
                        Ok(FastaRecord {
                            id,
                            description,
                            sequence,
                        })
                    });
                }
            }
        }
    }
}

pub fn write_record<W: Write>(writer: &mut W, record: &FastaRecord) -> std::io::Result<()> {
    if record.description.is_empty() {
        writeln!(writer, ">{}", record.id)?;
    } else {
        writeln!(writer, ">{} {}", record.id, record.description)?;
    }
    let bytes = record.sequence.as_bytes();
    for chunk in bytes.chunks(LINE_WIDTH) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub inputs: Vec<Utf8PathBuf>,
    pub records: usize,
    pub output: Option<Utf8PathBuf>,
}

/// Allele files in `dir`, ordered by file name.
pub fn allele_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, RefsError> {
    let mut files = dir
        .read_dir_utf8()
        .map_err(|err| RefsError::Filesystem(format!("read {dir}: {err}")))?
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| path.extension() == Some(ALLELE_EXTENSION) && path.is_file())
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Concatenates every allele file in `dir` into `dir/<output_name>`,
/// normalizing each record. Nothing is written when `dir` has no allele
/// files.
pub fn merge_allele_files(dir: &Utf8Path, output_name: &str) -> Result<MergeSummary, RefsError> {
    let inputs = allele_files(dir)?;
    if inputs.is_empty() {
        return Ok(MergeSummary {
            inputs,
            records: 0,
            output: None,
        });
    }

    let output = dir.join(output_name);
    let file = File::create(output.as_std_path())
        .map_err(|err| RefsError::Filesystem(format!("create {output}: {err}")))?;
    let mut writer = BufWriter::new(file);
    let mut records = 0;
    for input in &inputs {
        let handle = File::open(input.as_std_path())
            .map_err(|err| RefsError::Filesystem(format!("open {input}: {err}")))?;
        for record in FastaReader::new(BufReader::new(handle)) {
            let record = record.map_err(|err| match err {
                RefsError::FastaParse(message) => RefsError::FastaParse(format!("{input}: {message}")),
                other => other,
            })?;
            write_record(&mut writer, &record.normalized())
                .map_err(|err| RefsError::Filesystem(err.to_string()))?;
            records += 1;
        }
    }
    writer
        .flush()
        .map_err(|err| RefsError::Filesystem(err.to_string()))?;

    tracing::debug!(files = inputs.len(), records, path = %output, "merged allele files");
    Ok(MergeSummary {
        inputs,
        records,
        output: Some(output),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn reads_multiline_records() {
        let input = ">adk_1 some allele\nACGT\nACGT\n\n>adk_2\nTTTT\n";
        let records = FastaReader::new(Cursor::new(input))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "adk_1");
        assert_eq!(records[0].description, "some allele");
        assert_eq!(records[0].sequence, "ACGTACGT");
        assert_eq!(records[1].sequence, "TTTT");
    }

    #[test]
    fn rejects_headerless_input() {
        let mut reader = FastaReader::new(Cursor::new("ACGT\n>x\nA\n"));
        assert_matches!(reader.next(), Some(Err(RefsError::FastaParse(_))));
    }

    #[test]
    fn wraps_long_sequences() {
        let record = FastaRecord {
            id: "x".to_string(),
            description: String::new(),
            sequence: "A".repeat(130),
        };
        let mut out = Vec::new();
        write_record(&mut out, &record).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lengths = text.lines().skip(1).map(str::len).collect::<Vec<_>>();
        assert_eq!(lengths, vec![60, 60, 10]);
    }
}
