use quartz_utils::Error;

/// A pass that implements reporting Diagnostics
pub trait DiagnosticPass {
    /// Return the diagnostics gathered by this pass.
    fn diagnostics(&self) -> &DiagnosticContext;
}

/// A type for accumulating multiple errors. User-visible errors land here so
/// a pass can keep going and report everything it found at the end.
#[derive(Default, Debug)]
pub struct DiagnosticContext {
    errors: Vec<Error>,
    warnings: Vec<Error>,
}

impl DiagnosticContext {
    /// Report an `error`
    pub fn err(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Report a `warning`
    pub fn warning(&mut self, warning: Error) {
        self.warnings.push(warning)
    }

    pub fn errors_iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    pub fn warning_iter(&self) -> impl Iterator<Item = &Error> {
        self.warnings.iter()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
