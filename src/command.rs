use crate::error::SqlFluentDbError;
use crate::parameter::Parameter;

/// How the command text is interpreted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Ad hoc SQL text.
    #[default]
    Text,
    /// Name of a stored procedure.
    StoredProcedure,
    /// Whole-table access by name. Never accepted by the executor.
    TableDirect,
}

/// The single statement owned by an executor: text, kind, and ordered parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    text: String,
    kind: CommandKind,
    parameters: Vec<Parameter>,
    prepared: bool,
}

impl Command {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    /// Whether `prepare` has been called since the text last changed.
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub(crate) fn mark_prepared(&mut self) {
        self.prepared = true;
    }

    /// Replace the statement. Clears every bound parameter.
    pub(crate) fn set(&mut self, text: &str, kind: CommandKind) -> Result<(), SqlFluentDbError> {
        if text.trim().is_empty() {
            return Err(SqlFluentDbError::missing("command text"));
        }
        if kind == CommandKind::TableDirect {
            return Err(SqlFluentDbError::Unsupported(
                "table-direct commands are not supported".into(),
            ));
        }
        text.clone_into(&mut self.text);
        self.kind = kind;
        self.parameters.clear();
        self.prepared = false;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.text.clear();
        self.kind = CommandKind::Text;
        self.parameters.clear();
        self.prepared = false;
    }

    pub(crate) fn push(&mut self, parameter: Parameter) -> Result<(), SqlFluentDbError> {
        if self.position(&parameter.name).is_some() {
            return Err(SqlFluentDbError::InvalidState(format!(
                "parameter {} is already registered",
                parameter.name
            )));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Bare (prefix-less) name lookup, case-insensitive. Used by providers mapping placeholders
    /// and result columns back onto parameters.
    #[must_use]
    pub fn find_bare(&self, bare: &str) -> Option<usize> {
        self.parameters
            .iter()
            .position(|p| p.bare_name().eq_ignore_ascii_case(bare))
    }

    /// Reject commands that would run without text, or ad hoc text with no parameters.
    pub(crate) fn check(&self) -> Result<(), SqlFluentDbError> {
        if self.text.is_empty() {
            return Err(SqlFluentDbError::InvalidState(
                "no command text has been set".into(),
            ));
        }
        if self.kind == CommandKind::Text && self.parameters.is_empty() {
            return Err(SqlFluentDbError::InvalidState(
                "text commands must have at least one parameter".into(),
            ));
        }
        Ok(())
    }
}

/// Reader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandBehavior {
    /// Close the connection once the cursor is exhausted or dropped.
    pub close_connection: bool,
    /// Stop after the first row.
    pub single_row: bool,
}

impl CommandBehavior {
    #[must_use]
    pub fn with_close_connection(mut self, close_connection: bool) -> Self {
        self.close_connection = close_connection;
        self
    }

    #[must_use]
    pub fn with_single_row(mut self, single_row: bool) -> Self {
        self.single_row = single_row;
        self
    }
}
