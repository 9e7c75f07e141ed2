//! Define the PassManager structure that is used to register and run
//! passes over a design.
use crate::traversal;
use quartz_ir::Context;
use quartz_utils::{Error, MultiError};
use std::collections::HashMap;
use std::fmt::Write as _;

pub type PassResult<T> = std::result::Result<T, MultiError>;

/// Top-level type for all passes that transform a [Context]
pub type PassClosure = Box<dyn Fn(&mut Context) -> PassResult<()>>;

/// Structure that tracks all registered passes for the compiler.
#[derive(Default)]
pub struct PassManager {
    /// All registered passes
    passes: HashMap<String, PassClosure>,
    /// Help information for passes
    help: HashMap<String, String>,
}

impl PassManager {
    /// Register a new pass and return an error if another pass with the
    /// same name has already been registered.
    pub fn register_pass<Pass>(&mut self) -> PassResult<()>
    where
        Pass: traversal::Visitor
            + traversal::ConstructVisitor
            + traversal::Named,
    {
        self.register_generic_pass::<Pass>(Box::new(|ctx| {
            Pass::do_pass_default(ctx)?;
            Ok(())
        }))
    }

    /// Registers a diagnostic pass as a normal pass. If the pass gathered
    /// errors, the first run reporting them fails the plan.
    pub fn register_diagnostic<Pass>(&mut self) -> PassResult<()>
    where
        Pass: traversal::Visitor
            + traversal::ConstructVisitor
            + traversal::Named
            + traversal::DiagnosticPass,
    {
        self.register_generic_pass::<Pass>(Box::new(|ctx| {
            let mut visitor = Pass::from(ctx)?;
            visitor.do_pass(ctx)?;

            let errors: Vec<_> =
                visitor.diagnostics().errors_iter().cloned().collect();
            if !errors.is_empty() {
                Err(MultiError::from(errors))
            } else {
                // only show warnings if there are no errors
                visitor.diagnostics().warning_iter().for_each(|warning| {
                    log::warn!(target: Pass::name(), "{warning:?}")
                });
                Ok(())
            }
        }))
    }

    fn register_generic_pass<Pass>(
        &mut self,
        pass_closure: PassClosure,
    ) -> PassResult<()>
    where
        Pass: traversal::Visitor
            + traversal::ConstructVisitor
            + traversal::Named,
    {
        let name = Pass::name().to_string();
        if self.passes.contains_key(&name) {
            return Err(Error::misc(format!(
                "Pass with name '{}' is already registered.",
                name
            ))
            .into());
        }
        self.passes.insert(name.clone(), pass_closure);
        let mut help = format!("- {}: {}", name, Pass::description());
        for opt in Pass::opts() {
            write!(
                &mut help,
                "\n  * {}: {} (default: {})",
                opt.name(),
                opt.description(),
                opt.default()
            )
            .unwrap();
        }
        self.help.insert(name, help);
        Ok(())
    }

    /// Return the help string for a specific pass.
    pub fn specific_help(&self, pass_name: &str) -> Option<String> {
        self.help.get(pass_name).cloned()
    }

    /// Return a string representation to show all available passes.
    pub fn complete_help(&self) -> String {
        let mut names: Vec<_> = self.help.keys().collect();
        names.sort();
        let mut out = "Passes:\n".to_string();
        for name in names {
            writeln!(&mut out, "{}", self.help[name]).unwrap();
        }
        out
    }

    /// Run the passes named in `plan`, in order, against the context.
    pub fn execute_plan(
        &self,
        ctx: &mut Context,
        plan: &[String],
    ) -> PassResult<()> {
        for name in plan {
            let Some(pass) = self.passes.get(name) else {
                return Err(Error::misc(format!(
                    "Unknown pass: {}. Run with --help to see the list of \
                     registered passes.",
                    name
                ))
                .into());
            };
            log::info!("Running pass: {}", name);
            pass(ctx)?;
        }
        Ok(())
    }
}
