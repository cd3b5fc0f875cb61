//! Delimited-file plumbing: encoding labels, delimiter defaults, and the
//! CSV reader/writer builders used by the file sources and exports.
//!
//! Inputs may be in any `encoding_rs` encoding; exports are always UTF-8.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::{ByteRecord, QuoteStyle};
use encoding_rs::{Encoding, UTF_8};

const COMMA: u8 = b',';
const TAB: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

/// Tab for `.tsv` files, comma otherwise, unless one was given explicitly.
pub fn delimiter_for(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| {
        let is_tsv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
        if is_tsv { TAB } else { COMMA }
    })
}

/// Strict reader: every record must have as many fields as the header.
pub fn open_csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(BufReader::new(file)))
}

pub fn create_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<BufWriter<File>>> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(BufWriter::new(file)))
}

pub fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| {
            let (text, _, had_errors) = encoding.decode(field);
            if had_errors {
                Err(anyhow!("Field is not valid {}", encoding.name()))
            } else {
                Ok(text.into_owned())
            }
        })
        .collect()
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        TAB => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
