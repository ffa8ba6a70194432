use crate::error::{Error, Result};
use crate::operation::Operation;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::str::FromStr;

/// One line of an operation script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Operation(Operation),
    /// Move the deferred-task clock forward by this many milliseconds.
    Advance(u64),
    /// Run every deferred operation.
    Drain,
    /// Print the current statistics.
    Stats,
}

/// Parse an integer written in decimal, `0x` hexadecimal or `0b` binary.
pub fn parse_number(text: &str) -> Result<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let lowered = digits.to_ascii_lowercase();
    let parsed = if let Some(hex) = lowered.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lowered.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lowered.parse::<i64>()
    };
    parsed
        .map(|value| if negative { -value } else { value })
        .map_err(|_| Error::InvalidInput(format!("'{}' is not an integer", text)))
}

fn parse_unsigned<T: TryFrom<i64>>(text: &str) -> Result<T> {
    let value = parse_number(text)?;
    T::try_from(value).map_err(|_| {
        Error::InvalidInput(format!("'{}' must be a non-negative integer in range", text))
    })
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.starts_with('{') {
            return Ok(Command::Operation(serde_json::from_str(line)?));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let verb = tokens
            .first()
            .map(|verb| verb.to_ascii_lowercase())
            .unwrap_or_default();
        let args = tokens.get(1..).unwrap_or_default();
        let op = |operation: Operation| -> Result<Command> { Ok(Command::Operation(operation)) };

        match (verb.as_str(), args) {
            ("allocate" | "alloc", [size]) => op(Operation::Allocate {
                process_id: None,
                size: parse_unsigned(size)?,
            }),
            ("allocate" | "alloc", [pid, size]) => op(Operation::Allocate {
                process_id: Some(parse_unsigned(pid)?),
                size: parse_unsigned(size)?,
            }),
            ("deallocate" | "free", [pid]) => op(Operation::Deallocate {
                process_id: parse_unsigned(pid)?,
            }),
            ("fault" | "pagefault", [page]) => op(Operation::PageFault {
                page_number: parse_unsigned(page)?,
            }),
            ("swapin", [page]) => op(Operation::SwapIn {
                page_number: parse_unsigned(page)?,
            }),
            ("swapout", [page]) => op(Operation::SwapOut {
                page_number: parse_unsigned(page)?,
            }),
            ("translate", [address]) => op(Operation::TranslateAddress {
                virtual_address: parse_number(address)?,
            }),
            ("access" | "read", [address]) => op(Operation::AccessMemory {
                virtual_address: parse_number(address)?,
                write: false,
            }),
            ("access", [address, mode]) if mode.eq_ignore_ascii_case("w") => {
                op(Operation::AccessMemory {
                    virtual_address: parse_number(address)?,
                    write: true,
                })
            }
            ("write", [address]) => op(Operation::AccessMemory {
                virtual_address: parse_number(address)?,
                write: true,
            }),
            ("switch", [pid]) => op(Operation::SwitchProcess {
                process_id: parse_unsigned(pid)?,
            }),
            ("protect", [page, bits]) => op(Operation::SetProtection {
                page_number: parse_unsigned(page)?,
                protection: parse_unsigned(bits)?,
            }),
            ("reset", []) => op(Operation::Reset),
            ("advance", [ms]) => Ok(Command::Advance(parse_unsigned(ms)?)),
            ("drain", []) => Ok(Command::Drain),
            ("stats", []) => Ok(Command::Stats),
            _ => Err(Error::InvalidInput(format!("unrecognized command '{}'", line))),
        }
    }
}

/// `OperationReader` sequentially obtains commands from a script, one per line. Blank lines and
/// lines starting with `#` are skipped.
pub struct OperationReader<R> {
    reader: R,
    pub line_number: u64,
}

impl OperationReader<BufReader<File>> {
    /// Open a script file for reading.
    ///
    /// # Errors
    ///
    /// Fails if the file at the provided path cannot be opened.
    pub fn open(filename: &str) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(filename)?)))
    }
}

impl<R: BufRead> OperationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for OperationReader<R> {
    type Item = Result<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buffer = String::new();
            match self.reader.read_line(&mut buffer) {
                Err(err) => return Some(Err(err.into())),
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let line = buffer.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    return Some(line.parse::<Command>().map_err(|err| match err {
                        Error::InvalidInput(msg) => {
                            Error::InvalidInput(format!("line {}: {}", self.line_number, msg))
                        }
                        other => other,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::io::{Cursor, Write};

    #[cfg(test)]
    mod command_tests {

        use super::*;

        #[test]
        fn numbers() {
            assert_eq!(parse_number("0x3F24A").unwrap(), 0x3F24A);
            assert_eq!(parse_number("0b101").unwrap(), 5);
            assert_eq!(parse_number("-12").unwrap(), -12);
            assert!(parse_number("twelve").is_err());
        }

        #[test]
        fn text_commands() {
            assert_eq!(
                "allocate 1 16".parse::<Command>().unwrap(),
                Command::Operation(Operation::Allocate {
                    process_id: Some(1),
                    size: 16
                })
            );
            assert_eq!(
                "translate 0x3F24A".parse::<Command>().unwrap(),
                Command::Operation(Operation::TranslateAddress {
                    virtual_address: 0x3F24A
                })
            );
            assert_eq!(
                "access 0x400000 w".parse::<Command>().unwrap(),
                Command::Operation(Operation::AccessMemory {
                    virtual_address: 0x400000,
                    write: true
                })
            );
            assert_eq!(
                "protect 48 0b101".parse::<Command>().unwrap(),
                Command::Operation(Operation::SetProtection {
                    page_number: 48,
                    protection: 5
                })
            );
            assert_eq!("ADVANCE 500".parse::<Command>().unwrap(), Command::Advance(500));
            assert_eq!("drain".parse::<Command>().unwrap(), Command::Drain);
            assert_eq!(
                "reset".parse::<Command>().unwrap(),
                Command::Operation(Operation::Reset)
            );
        }

        #[test]
        fn json_commands() {
            assert_eq!(
                r#"{"type":"swapOut","pageNumber":49}"#
                    .parse::<Command>()
                    .unwrap(),
                Command::Operation(Operation::SwapOut { page_number: 49 })
            );
        }

        #[test]
        fn rejects_garbage() {
            assert!("allocate".parse::<Command>().is_err());
            assert!("swapin -3".parse::<Command>().is_err());
            assert!("protect 1 300".parse::<Command>().is_err());
            assert!("defragment".parse::<Command>().is_err());
            assert!("{not json".parse::<Command>().is_err());
        }
    }

    #[cfg(test)]
    mod operation_reader_tests {

        use super::*;

        const SCRIPT: &str = "# warm up\nallocate 1 16\n\ntranslate 0xC000000\nstats\n";

        #[test]
        fn iterator() {
            let mut reader = OperationReader::new(Cursor::new(SCRIPT));
            assert_eq!(reader.line_number, 0);
            assert!(matches!(
                reader.next(),
                Some(Ok(Command::Operation(Operation::Allocate { .. })))
            ));
            assert_eq!(reader.line_number, 2);
            assert!(matches!(
                reader.next(),
                Some(Ok(Command::Operation(Operation::TranslateAddress { .. })))
            ));
            assert!(matches!(reader.next(), Some(Ok(Command::Stats))));
            assert!(reader.next().is_none());
        }

        #[test]
        fn reports_line_numbers() {
            let mut reader = OperationReader::new(Cursor::new("reset\nbogus 1\n"));
            assert!(reader.next().unwrap().is_ok());
            let err = reader.next().unwrap().unwrap_err();
            assert!(err.to_string().starts_with("line 2:"));
        }

        #[test]
        fn open() {
            let path = std::env::temp_dir().join("memory_visualizer_sim_script_test.txt");
            let mut file = File::create(&path).unwrap();
            file.write_all(SCRIPT.as_bytes()).unwrap();

            let reader = OperationReader::open(path.to_str().unwrap()).unwrap();
            assert_eq!(reader.filter(|command| command.is_ok()).count(), 3);
            std::fs::remove_file(path).unwrap();
        }

        #[test]
        fn open_missing() {
            assert!(OperationReader::open("/definitely/not/here.txt").is_err());
        }
    }
}
