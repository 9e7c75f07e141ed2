//! Centralized error handling for the Quartz compiler. Each variant of the
//! kind enum represents a different class of error; constructor methods are
//! preferred over building kinds directly.

use crate::position::GPosIdx;
use itertools::Itertools;

/// Standard result type for the compiler.
pub type QuartzResult<T> = std::result::Result<T, Error>;

/// An error with an optional source position attached.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    pos: GPosIdx,
    post_msg: Option<Box<str>>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pos.into_option() {
            Some(pos) => write!(f, "{}", pos.format(self.kind.to_string()))?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{}", post)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// An error the user caused and can fix themselves.
    pub fn papercut<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Papercut(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
            post_msg: None,
        }
    }

    /// The IR is structurally malformed.
    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::MalformedStructure(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
            post_msg: None,
        }
    }

    /// An invariant a pass relies on was violated: an internal compiler
    /// error, not a user mistake.
    pub fn pass_assumption<P: ToString, S: ToString>(pass: P, msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::PassAssumption(
                pass.to_string(),
                msg.to_string(),
            )),
            pos: GPosIdx::UNKNOWN,
            post_msg: None,
        }
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Misc(msg.to_string())),
            pos: GPosIdx::UNKNOWN,
            post_msg: None,
        }
    }

    /// Attach a source position to this error.
    pub fn with_pos(mut self, pos: GPosIdx) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg.map(|s| s.into());
        self
    }

    /// The message without any position annotation.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn pos(&self) -> GPosIdx {
        self.pos
    }
}

#[derive(Clone)]
enum ErrorKind {
    /// An error the user caused and can fix themselves.
    Papercut(String),
    /// The IR is structurally malformed.
    MalformedStructure(String),
    /// A pass's assumption about the input was violated.
    PassAssumption(String, String),
    /// Miscellaneous error message.
    Misc(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Papercut(msg) => write!(f, "{}", msg),
            ErrorKind::MalformedStructure(msg) => {
                write!(f, "malformed structure: {}", msg)
            }
            ErrorKind::PassAssumption(pass, msg) => write!(
                f,
                "{}: internal compiler error: {}",
                pass, msg
            ),
            ErrorKind::Misc(msg) => write!(f, "{}", msg),
        }
    }
}

/// A collection of errors produced by a single pass or plan.
#[derive(Clone)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Debug for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.errors.iter().map(|e| format!("{e:?}")).join("\n")
        )
    }
}

impl From<Error> for MultiError {
    fn from(e: Error) -> Self {
        Self { errors: vec![e] }
    }
}

impl From<Vec<Error>> for MultiError {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}
