/*!
The text record format of modification stores.

Every record is one line with comma separated fields in a fixed order:

```text
DELETION,<path-pattern>,<start_time>,<end_time>,<version>\n
```

The numeric fields are parsed from the right so that a path pattern may itself contain commas. A
path pattern can never contain a line break.

A store is read front to back. Reading stops at the first line that is missing its terminator or
that fails to parse. Everything before that point is the committed log. Anything after it is the
remainder of a write that was interrupted and is not part of the log.
*/

use std::convert::TryFrom;
use std::str;

use crate::errors::{StorageError, StorageResult};

use super::model::{Deletion, Modification};
use super::path_pattern::PathPattern;

/// Tag of [`Modification::Deletion`] records.
const DELETION_TAG: &str = "DELETION";

/// Separator between the fields of a record.
const FIELD_SEPARATOR: char = ',';

/// Terminator of every record.
const RECORD_TERMINATOR: u8 = b'\n';

impl From<&Modification> for Vec<u8> {
    fn from(modification: &Modification) -> Self {
        let line = match modification {
            Modification::Deletion(deletion) => format!(
                "{tag}{sep}{path}{sep}{start}{sep}{end}{sep}{version}",
                tag = DELETION_TAG,
                sep = FIELD_SEPARATOR,
                path = deletion.path(),
                start = deletion.start_time(),
                end = deletion.end_time(),
                version = deletion.version()
            ),
        };

        let mut buf = line.into_bytes();
        buf.push(RECORD_TERMINATOR);

        buf
    }
}

impl TryFrom<&[u8]> for Modification {
    type Error = StorageError;

    /// Parse a single record. The buffer must not include the record terminator.
    fn try_from(buf: &[u8]) -> StorageResult<Modification> {
        let line = str::from_utf8(buf).map_err(|err| {
            StorageError::InvalidRecord(format!("The record is not valid UTF-8. Error: {err}"))
        })?;

        // Fields from the right: version, end time, start time and then the tag with the path
        let mut fields = line.rsplitn(4, FIELD_SEPARATOR);
        let version = fields.next();
        let end_time = fields.next();
        let start_time = fields.next();
        let head = fields.next();
        let (version, end_time, start_time, head) = match (version, end_time, start_time, head) {
            (Some(version), Some(end_time), Some(start_time), Some(head)) => {
                (version, end_time, start_time, head)
            }
            _ => {
                return Err(StorageError::InvalidRecord(format!(
                    "The record {line:?} does not have enough fields."
                )))
            }
        };

        let (tag, path) = head.split_once(FIELD_SEPARATOR).ok_or_else(|| {
            StorageError::InvalidRecord(format!("The record {line:?} is missing a path."))
        })?;

        match tag {
            DELETION_TAG => {
                let deletion = Deletion::new(
                    PathPattern::new(path)?,
                    parse_field(start_time, "start time")?,
                    parse_field(end_time, "end time")?,
                    parse_field(version, "version")?,
                )?;

                Ok(Modification::Deletion(deletion))
            }
            _ => Err(StorageError::InvalidRecord(format!(
                "Unknown modification type {tag:?}."
            ))),
        }
    }
}

fn parse_field<T: str::FromStr>(field: &str, field_name: &str) -> StorageResult<T>
where
    T::Err: std::fmt::Display,
{
    field.parse::<T>().map_err(|err| {
        StorageError::InvalidRecord(format!(
            "Failed to parse the {field_name} field {field:?}. Error: {err}"
        ))
    })
}

/// The committed contents of a modification store.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct DecodedRecords {
    /// The well-formed records in store order.
    pub(crate) modifications: Vec<Modification>,

    /// The byte offset at which each record in `modifications` starts.
    pub(crate) record_offsets: Vec<u64>,

    /// The length of the well-formed prefix of the store in bytes.
    pub(crate) valid_length: u64,
}

/// Decode every record of a store, stopping at the first incomplete or malformed record.
pub(crate) fn decode_records(buf: &[u8]) -> DecodedRecords {
    let mut decoded = DecodedRecords::default();
    let mut offset: usize = 0;

    while offset < buf.len() {
        let remaining = &buf[offset..];
        let line_length = match remaining.iter().position(|&byte| byte == RECORD_TERMINATOR) {
            Some(line_length) => line_length,
            None => {
                log::warn!(
                    "Found an unterminated record of {} bytes at offset {}. Treating it as the \
                    end of the log.",
                    remaining.len(),
                    offset
                );
                break;
            }
        };

        match Modification::try_from(&remaining[..line_length]) {
            Ok(modification) => {
                decoded.modifications.push(modification);
                decoded.record_offsets.push(offset as u64);
                offset += line_length + 1;
            }
            Err(parse_err) => {
                log::warn!(
                    "Found a malformed record at offset {}. Treating it as the end of the log. \
                    Error: {}",
                    offset,
                    parse_err
                );
                break;
            }
        }
    }

    decoded.valid_length = offset as u64;
    decoded
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn deletion(path: &str, start_time: i64, end_time: i64, version: u64) -> Modification {
        Deletion::new(PathPattern::new(path).unwrap(), start_time, end_time, version)
            .unwrap()
            .into()
    }

    #[test]
    fn deletions_are_encoded_as_a_single_line() {
        let encoded = Vec::<u8>::from(&deletion("root.sg1.d1.s1", -5, 10, 101));

        assert_eq!(encoded, b"DELETION,root.sg1.d1.s1,-5,10,101\n".to_vec());
    }

    #[test]
    fn can_parse_a_record_with_commas_in_the_path() {
        let parsed = Modification::try_from(&b"DELETION,root.sg1.`a,b`.s1,0,9,3"[..]).unwrap();

        assert_eq!(parsed, deletion("root.sg1.`a,b`.s1", 0, 9, 3));
    }

    #[test]
    fn rejects_malformed_records() {
        let malformed_records: [&[u8]; 6] = [
            b"DELETION,root.sg1.d1.s1,0,9",
            b"INSERTION,root.sg1.d1.s1,0,9,3",
            b"DELETION,root.sg1.d1.s1,0,nine,3",
            b"DELETION,root.sg1.d1.s1,9,0,3",
            b"DELETION,root.sg1.d1.s1,0,9,-3",
            b"DELETION,,0,9,3",
        ];

        for record in malformed_records {
            assert!(
                Modification::try_from(record).is_err(),
                "Expected {:?} to be rejected",
                str::from_utf8(record).unwrap()
            );
        }
    }

    #[test]
    fn decoding_tracks_record_boundaries() {
        let first = deletion("root.sg1.d1.s1", 0, 10, 101);
        let second = deletion("root.sg1.**", 5, 6, 102);
        let mut buf = Vec::<u8>::from(&first);
        let first_length = buf.len() as u64;
        buf.extend(Vec::<u8>::from(&second));

        let decoded = decode_records(&buf);

        assert_eq!(decoded.modifications, vec![first, second]);
        assert_eq!(decoded.record_offsets, vec![0, first_length]);
        assert_eq!(decoded.valid_length, buf.len() as u64);
    }

    #[test]
    fn decoding_stops_at_a_partial_or_corrupt_tail() {
        let first = deletion("root.sg1.d1.s1", 0, 10, 101);
        let mut buf = Vec::<u8>::from(&first);
        let valid_length = buf.len() as u64;

        let mut partial = buf.clone();
        partial.extend_from_slice(b"DELETION,root.sg1.d1.s2,0,");
        let decoded = decode_records(&partial);
        assert_eq!(decoded.modifications, vec![first.clone()]);
        assert_eq!(decoded.valid_length, valid_length);

        // A corrupt line hides everything after it
        buf.extend_from_slice(b"DELET\xffON,garbage\n");
        buf.extend(Vec::<u8>::from(&deletion("root.sg1.d1.s3", 0, 1, 105)));
        let decoded = decode_records(&buf);
        assert_eq!(decoded.modifications, vec![first]);
        assert_eq!(decoded.valid_length, valid_length);
    }

    #[test]
    fn decoding_an_empty_store_yields_nothing() {
        assert_eq!(decode_records(&[]), DecodedRecords::default());
    }
}
