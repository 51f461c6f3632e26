//! Corpus loading from a delimited file of statements.
//!
//! Every row's text column is lowercased and the rows are joined with a
//! single space into one immutable character sequence.

use log::{debug, info};
use std::path::Path;

use crate::error::{CharRnnError, Result};

/// Text encoding used to decode the corpus file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl std::str::FromStr for TextEncoding {
    type Err = CharRnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(CharRnnError::InvalidConfig(format!(
                "unsupported encoding: {other}"
            ))),
        }
    }
}

/// Column holding the statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextColumn {
    /// Header name; requires `has_headers`.
    Name(String),
    /// Zero-based field index.
    Index(usize),
}

/// How to read the corpus file.
#[derive(Debug, Clone)]
pub struct CorpusOptions {
    pub delimiter: u8,
    pub has_headers: bool,
    pub column: TextColumn,
    pub encoding: TextEncoding,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
            column: TextColumn::Name("text".to_string()),
            encoding: TextEncoding::Utf8,
        }
    }
}

/// Immutable lowercase training text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    chars: Vec<char>,
    rows: usize,
}

impl Corpus {
    /// Build a corpus from already-extracted rows.
    ///
    /// # Errors
    ///
    /// Returns `Corpus` if there are no rows or the joined text is empty.
    pub fn from_rows<I, S>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut count = 0usize;
        for row in rows {
            if count > 0 {
                text.push(' ');
            }
            text.push_str(&row.as_ref().to_lowercase());
            count += 1;
        }

        if count == 0 || text.is_empty() {
            return Err(CharRnnError::Corpus("corpus is empty".into()));
        }

        Ok(Self {
            chars: text.chars().collect(),
            rows: count,
        })
    }

    /// Read the text column of a delimited file.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `Corpus` if it is not valid in the chosen encoding, the column is
    ///   missing, or no text remains
    /// - `Csv` on malformed records
    pub fn load(path: &Path, options: &CorpusOptions) -> Result<Self> {
        info!("Loading corpus from {}", path.display());
        let bytes = std::fs::read(path)?;
        let corpus = Self::parse(&bytes, options)?;
        info!(
            "  {} rows, {} characters",
            corpus.rows,
            corpus.chars.len()
        );
        Ok(corpus)
    }

    /// Parse delimited content already in memory.
    ///
    /// # Errors
    ///
    /// Same as [`Corpus::load`] minus I/O.
    pub fn parse(bytes: &[u8], options: &CorpusOptions) -> Result<Self> {
        let text = decode(bytes, options.encoding)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(options.has_headers)
            .flexible(true)
            .from_reader(text.as_bytes());

        let column = match &options.column {
            TextColumn::Index(i) => *i,
            TextColumn::Name(name) => {
                if !options.has_headers {
                    return Err(CharRnnError::InvalidConfig(format!(
                        "column {name:?} selected by name but the file has no header row"
                    )));
                }
                reader
                    .headers()?
                    .iter()
                    .position(|h| h.trim() == name)
                    .ok_or_else(|| {
                        CharRnnError::Corpus(format!("no column named {name:?} in header"))
                    })?
            }
        };
        debug!("Reading text from column {column}");

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let field = record.get(column).ok_or_else(|| {
                CharRnnError::Corpus(format!("record {} has no column {column}", line + 1))
            })?;
            rows.push(field.to_string());
        }

        Self::from_rows(rows)
    }

    /// Characters of the corpus.
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Total character count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Number of statements joined into the corpus.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }
}

fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8(bytes.to_vec())
                .map_err(|e| CharRnnError::Corpus(format!("invalid UTF-8: {e}")))
        }
        TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_joined_lowercase() {
        let corpus = Corpus::from_rows(["Hello World", "Bye"]).unwrap();
        let text: String = corpus.chars().iter().collect();
        assert_eq!(text, "hello world bye");
        assert_eq!(corpus.rows(), 2);
        assert_eq!(corpus.len(), 15);
    }

    #[test]
    fn test_empty_corpus() {
        assert!(Corpus::from_rows(Vec::<String>::new()).is_err());
        assert!(Corpus::from_rows([""]).is_err());
    }

    #[test]
    fn test_parse_by_header_name() {
        let data = b"id,text,label\n1,\"First, statement\",x\n2,Second one,y\n";
        let corpus = Corpus::parse(data, &CorpusOptions::default()).unwrap();
        let text: String = corpus.chars().iter().collect();
        assert_eq!(text, "first, statement second one");
    }

    #[test]
    fn test_parse_by_index_without_header() {
        let options = CorpusOptions {
            delimiter: b'\t',
            has_headers: false,
            column: TextColumn::Index(1),
            encoding: TextEncoding::Utf8,
        };
        let corpus = Corpus::parse(b"a\tOne\nb\tTwo\n", &options).unwrap();
        let text: String = corpus.chars().iter().collect();
        assert_eq!(text, "one two");
    }

    #[test]
    fn test_missing_column() {
        let options = CorpusOptions {
            column: TextColumn::Name("statement".into()),
            ..CorpusOptions::default()
        };
        let result = Corpus::parse(b"id,text\n1,abc\n", &options);
        assert!(matches!(result, Err(CharRnnError::Corpus(_))));
    }

    #[test]
    fn test_short_record() {
        let options = CorpusOptions {
            column: TextColumn::Index(2),
            ..CorpusOptions::default()
        };
        let result = Corpus::parse(b"id,text\n1,abc\n", &options);
        assert!(matches!(result, Err(CharRnnError::Corpus(_))));
    }

    #[test]
    fn test_latin1_decoding() {
        let options = CorpusOptions {
            encoding: TextEncoding::Latin1,
            ..CorpusOptions::default()
        };
        // "Caf\xe9" in ISO-8859-1
        let corpus = Corpus::parse(b"text\nCaf\xe9\n", &options).unwrap();
        let text: String = corpus.chars().iter().collect();
        assert_eq!(text, "caf\u{e9}");
    }

    #[test]
    fn test_invalid_utf8() {
        let result = Corpus::parse(b"text\nCaf\xe9\n", &CorpusOptions::default());
        assert!(matches!(result, Err(CharRnnError::Corpus(_))));
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("latin_1".parse::<TextEncoding>().unwrap(), TextEncoding::Latin1);
        assert!("utf-16".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Corpus::load(Path::new("/nonexistent/corpus.csv"), &CorpusOptions::default());
        assert!(matches!(result, Err(CharRnnError::Io(_))));
    }
}
