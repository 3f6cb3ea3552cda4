/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Client procedures and the commands that start them.
//!
//! A command has the form `<server-address> <name> <args...>`:
//!
//! |Command|Effect|
//! |---|---|
//! |`create f`|Create an empty file.|
//! |`exists f`|Check whether a file exists.|
//! |`read f`|Read a file.|
//! |`append f text...`|Append text to an existing file.|
//! |`overwrite f text...`|Replace the content of an existing file.|
//! |`delete f`|Delete a file.|
//! |`put f text...`|Create the file if it is missing, then overwrite it.|
//! |`copy src dst`|Read `src`, create `dst`, and overwrite `dst` with the content of `src`.|
//!
//! Every procedure runs inside exactly one transaction.

use std::fmt::{self, Display, Formatter};

use crate::{
    transaction::messages::{OpResult, Operation},
    types::data_types::NodeAddress,
};

/// The next step a procedure wants to take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Yielded {
    StartTransaction,
    Perform(Operation),
    Commit,
    Done(OpResult),
}

/// An explicit state machine for one client command.
///
/// The client calls `resume` once to start the procedure, and then once every time the step the
/// procedure last yielded has completed. `last` carries the result of the last `Perform` and is
/// `None` after the other steps.
pub trait Procedure: Send {
    fn resume(&mut self, last: Option<OpResult>) -> Yielded;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    InvalidAddress(String),
    UnknownCommand(String),
    WrongArity {
        command: String,
        expected: usize,
        got: usize,
    },

    /// A `paxos_propose` argument is not of the form `file=content`.
    InvalidWrite(String),

    /// The same command is still running.
    AlreadyPending(String),
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::InvalidAddress(address) => write!(f, "invalid address {}", address),
            CommandError::UnknownCommand(name) => write!(f, "unknown command {}", name),
            CommandError::WrongArity {
                command,
                expected,
                got,
            } => write!(
                f,
                "{} takes at least {} arguments, got {}",
                command, expected, got
            ),
            CommandError::InvalidWrite(arg) => write!(f, "expected file=content, got {}", arg),
            CommandError::AlreadyPending(command) => {
                write!(f, "command \"{}\" is already pending", command)
            }
        }
    }
}

/// Parse a client command into the serving node's address and the procedure to run.
pub fn parse_command(line: &str) -> Result<(NodeAddress, Box<dyn Procedure>), CommandError> {
    let mut words = line.split_whitespace();
    let address = words.next().ok_or(CommandError::Empty)?;
    let server = address
        .parse()
        .map_err(|_| CommandError::InvalidAddress(address.to_string()))?;
    let name = words.next().ok_or(CommandError::Empty)?;
    let args: Vec<&str> = words.collect();

    let arity = |expected: usize| {
        if args.len() < expected {
            Err(CommandError::WrongArity {
                command: name.to_string(),
                expected,
                got: args.len(),
            })
        } else {
            Ok(())
        }
    };
    let filename = || args[0].to_string();
    let text = || args[1..].join(" ").into_bytes();

    let procedure: Box<dyn Procedure> = match name {
        "create" => {
            arity(1)?;
            Box::new(SingleOperation::new(Operation::Create {
                filename: filename(),
            }))
        }
        "exists" => {
            arity(1)?;
            Box::new(SingleOperation::new(Operation::Exists {
                filename: filename(),
            }))
        }
        "read" => {
            arity(1)?;
            Box::new(SingleOperation::new(Operation::Read {
                filename: filename(),
            }))
        }
        "append" => {
            arity(2)?;
            Box::new(SingleOperation::new(Operation::Append {
                filename: filename(),
                data: text(),
            }))
        }
        "overwrite" => {
            arity(2)?;
            Box::new(SingleOperation::new(Operation::Overwrite {
                filename: filename(),
                data: text(),
            }))
        }
        "delete" => {
            arity(1)?;
            Box::new(SingleOperation::new(Operation::Delete {
                filename: filename(),
            }))
        }
        "put" => {
            arity(2)?;
            Box::new(Put::new(filename(), text()))
        }
        "copy" => {
            arity(2)?;
            Box::new(CopyFile::new(filename(), args[1].to_string()))
        }
        _ => return Err(CommandError::UnknownCommand(name.to_string())),
    };
    Ok((server, procedure))
}

/// Perform one operation in its own transaction.
pub struct SingleOperation {
    operation: Operation,
    stage: Stage,
}

enum Stage {
    Start,
    Began,
    Performing,
    Committing(OpResult),
    Finished,
}

impl SingleOperation {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            stage: Stage::Start,
        }
    }
}

impl Procedure for SingleOperation {
    fn resume(&mut self, last: Option<OpResult>) -> Yielded {
        match std::mem::replace(&mut self.stage, Stage::Finished) {
            Stage::Start => {
                self.stage = Stage::Began;
                Yielded::StartTransaction
            }
            Stage::Began => {
                self.stage = Stage::Performing;
                Yielded::Perform(self.operation.clone())
            }
            Stage::Performing => {
                self.stage = Stage::Committing(last.unwrap_or(OpResult::Bool(false)));
                Yielded::Commit
            }
            Stage::Committing(result) => Yielded::Done(result),
            Stage::Finished => Yielded::Done(OpResult::Bool(false)),
        }
    }
}

/// Create `filename` if it does not exist, then overwrite it with `data`.
pub struct Put {
    filename: String,
    data: Vec<u8>,
    step: u8,
    result: Option<OpResult>,
}

impl Put {
    pub fn new(filename: String, data: Vec<u8>) -> Self {
        Self {
            filename,
            data,
            step: 0,
            result: None,
        }
    }

    fn overwrite(&mut self) -> Yielded {
        self.step = 4;
        Yielded::Perform(Operation::Overwrite {
            filename: self.filename.clone(),
            data: self.data.clone(),
        })
    }
}

impl Procedure for Put {
    fn resume(&mut self, last: Option<OpResult>) -> Yielded {
        match self.step {
            0 => {
                self.step = 1;
                Yielded::StartTransaction
            }
            1 => {
                self.step = 2;
                Yielded::Perform(Operation::Exists {
                    filename: self.filename.clone(),
                })
            }
            2 if last == Some(OpResult::Bool(true)) => self.overwrite(),
            2 => {
                self.step = 3;
                Yielded::Perform(Operation::Create {
                    filename: self.filename.clone(),
                })
            }
            3 => self.overwrite(),
            4 => {
                self.step = 5;
                self.result = last;
                Yielded::Commit
            }
            _ => Yielded::Done(self.result.take().unwrap_or(OpResult::Bool(false))),
        }
    }
}

/// Copy the content of `source` into `destination`, creating `destination` if needed.
pub struct CopyFile {
    source: String,
    destination: String,
    step: u8,
    result: OpResult,
}

impl CopyFile {
    pub fn new(source: String, destination: String) -> Self {
        Self {
            source,
            destination,
            step: 0,
            result: OpResult::Bool(false),
        }
    }
}

impl Procedure for CopyFile {
    fn resume(&mut self, last: Option<OpResult>) -> Yielded {
        match self.step {
            0 => {
                self.step = 1;
                Yielded::StartTransaction
            }
            1 => {
                self.step = 2;
                Yielded::Perform(Operation::Read {
                    filename: self.source.clone(),
                })
            }
            2 => match last {
                Some(OpResult::Content(Some(content))) => {
                    self.step = 3;
                    self.result = OpResult::Content(Some(content));
                    Yielded::Perform(Operation::Create {
                        filename: self.destination.clone(),
                    })
                }
                // Nothing to copy.
                _ => {
                    self.step = 5;
                    Yielded::Commit
                }
            },
            3 => {
                self.step = 4;
                let data = match std::mem::replace(&mut self.result, OpResult::Bool(false)) {
                    OpResult::Content(Some(content)) => content,
                    _ => Vec::new(),
                };
                Yielded::Perform(Operation::Overwrite {
                    filename: self.destination.clone(),
                    data,
                })
            }
            4 => {
                self.step = 5;
                self.result = last.unwrap_or(OpResult::Bool(false));
                Yielded::Commit
            }
            _ => Yielded::Done(self.result.clone()),
        }
    }
}
