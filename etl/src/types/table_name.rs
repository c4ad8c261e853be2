use pg_escape::quote_identifier;
use std::fmt;

/// A Postgres table, optionally qualified by its schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    /// Schema containing the table, `None` resolves through the `search_path`.
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<String>, name: String) -> TableName {
        Self { schema, name }
    }

    /// Parses `name` or `schema.name`.
    ///
    /// Only the first dot separates the schema, dots in quoted identifiers are not supported.
    pub fn parse(value: &str) -> TableName {
        match value.trim().split_once('.') {
            Some((schema, name)) => TableName::new(Some(schema.to_owned()), name.to_owned()),
            None => TableName::new(None, value.trim().to_owned()),
        }
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_name = quote_identifier(&self.name);

        match &self.schema {
            Some(schema) => {
                let quoted_schema = quote_identifier(schema);
                format!("{quoted_schema}.{quoted_name}")
            }
            None => quoted_name.into_owned(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_schema() {
        let table = TableName::parse("public.chan_4chan_post");
        assert_eq!(table.schema.as_deref(), Some("public"));
        assert_eq!(table.name, "chan_4chan_post");
        assert_eq!(table.to_string(), "public.chan_4chan_post");

        let table = TableName::parse(" chan_8kun2_post ");
        assert_eq!(table.schema, None);
        assert_eq!(table.to_string(), "chan_8kun2_post");
    }

    #[test]
    fn quoted_identifier_escapes_names() {
        assert_eq!(
            TableName::parse("chan_4chan_post").as_quoted_identifier(),
            "chan_4chan_post"
        );
        assert_eq!(
            TableName::new(Some("Archive".to_owned()), "posts\"x".to_owned())
                .as_quoted_identifier(),
            "\"Archive\".\"posts\"\"x\""
        );
    }
}
