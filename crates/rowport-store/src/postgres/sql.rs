use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;

use rowport_core::FieldValue;

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

enum Bind<'a> {
    Value(&'a FieldValue),
    Text(&'a str),
}

/// Dynamic statement with positional parameters.
///
/// Null values are written as `NULL` literals so no parameter type has to
/// be guessed for them.
pub struct SqlBuilder<'a> {
    sql: String,
    binds: Vec<Bind<'a>>,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    pub fn push_text(&mut self, value: &'a str) -> &mut Self {
        self.binds.push(Bind::Text(value));
        let placeholder = format!("${}", self.binds.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn push_value(&mut self, value: &'a FieldValue) -> &mut Self {
        if value.is_null() {
            self.sql.push_str("NULL");
            return self;
        }
        self.binds.push(Bind::Value(value));
        let placeholder = format!("${}", self.binds.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn build(&self) -> PgQuery<'_> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                Bind::Text(value) => query.bind(*value),
                Bind::Value(value) => bind_value(query, value),
            };
        }
        query
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &'q FieldValue) -> PgQuery<'q> {
    match value {
        FieldValue::Null => query,
        FieldValue::Text(value) => query.bind(value.as_str()),
        FieldValue::Integer(value) => query.bind(*value),
        FieldValue::Number(value) => query.bind(*value),
        FieldValue::Boolean(value) => query.bind(*value),
        FieldValue::Date(value) => query.bind(*value),
        FieldValue::DateTime(value) => query.bind(*value),
        FieldValue::List(items) => query.bind(items.as_slice()),
        FieldValue::Json(value) => query.bind(sqlx::types::Json(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("assets"), "\"assets\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn nulls_become_literals_and_skip_placeholders() {
        let org = "acme".to_string();
        let tag = FieldValue::from("A-1");
        let null = FieldValue::Null;
        let mut builder = SqlBuilder::new("VALUES (");
        builder
            .push_text(&org)
            .push(", ")
            .push_value(&null)
            .push(", ")
            .push_value(&tag)
            .push(")");
        assert_eq!(builder.sql(), "VALUES ($1, NULL, $2)");
    }
}
