use crate::types::SqlValue;

/// One bind variable of a statement.
///
/// Parameters are bound positionally (`$1`, `$2`, ...) in the order they are
/// passed. The name identifies the parameter when output values are copied
/// back after [`Connector::execute`](crate::Connector::execute).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub value: SqlValue,
    pub output: bool,
}

impl QueryParameter {
    /// An input parameter.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            output: false,
        }
    }

    /// An output parameter. `value` is sent to the engine as the initial
    /// value and overwritten with what the engine returns.
    pub fn output(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            output: true,
        }
    }

    /// Name without a leading `@`, `:` or `$` marker.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches(['@', ':', '$'])
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Text,
    StoredProcedure,
}

/// A statement ready to be sent to a session.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    pub text: &'a str,
    pub kind: CommandKind,
    pub params: &'a [QueryParameter],
}

impl<'a> Command<'a> {
    pub fn text(text: &'a str, params: &'a [QueryParameter]) -> Self {
        Self {
            text,
            kind: CommandKind::Text,
            params,
        }
    }

    pub fn stored_procedure(name: &'a str, params: &'a [QueryParameter]) -> Self {
        Self {
            text: name,
            kind: CommandKind::StoredProcedure,
            params,
        }
    }

    /// SQL sent to the engine. Stored procedures become
    /// `CALL name($1, ..., $n)` with one placeholder per parameter.
    pub fn sql(&self) -> String {
        match self.kind {
            CommandKind::Text => self.text.to_string(),
            CommandKind::StoredProcedure => {
                let mut sql = String::with_capacity(self.text.len() + 8 + self.params.len() * 4);
                sql.push_str("CALL ");
                sql.push_str(self.text);
                sql.push('(');
                for i in 0..self.params.len() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push('$');
                    sql.push_str(&(i + 1).to_string());
                }
                sql.push(')');
                sql
            }
        }
    }

    /// Parameters sent to the engine, in placeholder order.
    ///
    /// Stored procedures bind every parameter, output ones included as
    /// `INOUT` arguments. Text commands bind only inputs; their outputs are
    /// filled from `RETURNING` columns.
    pub fn bound(&self) -> Vec<&'a QueryParameter> {
        let params = self.params.iter();
        match self.kind {
            CommandKind::StoredProcedure => params.collect(),
            CommandKind::Text => params.filter(|p| !p.output).collect(),
        }
    }

    /// Values of [`bound`](Self::bound) parameters.
    pub fn values(&self) -> Vec<SqlValue> {
        self.bound().into_iter().map(|p| p.value.clone()).collect()
    }

    pub fn has_outputs(&self) -> bool {
        self.params.iter().any(|p| p.output)
    }
}
