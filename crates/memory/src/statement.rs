use crate::error::Error;

use tabular_spi::{Column, ColumnType, Columns, StatementType, TableType};

/// Name of the pseudo column exposing each row's arrival time.
pub const ARRIVAL_TIME: &str = "_ARRIVAL_TIME";

/// A parsed statement of the engine's vocabulary.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        table_type: TableType,
        columns: Columns,
    },
    DropTable {
        table: String,
    },
    Insert {
        table: String,
        placeholders: usize,
    },
    Delete {
        table: String,
    },
    Select {
        table: String,
        arrival_time: bool,
        limit: Option<usize>,
    },
    Count {
        table: String,
    },
}

impl Statement {
    /// Parses `sql`. Keywords are case-insensitive; table names are lowercased.
    pub fn parse(sql: &str) -> Result<Self, Error> {
        let mut parser = Parser::new(sql);
        let statement = parser.statement()?;
        if parser.is_done() {
            Ok(statement)
        } else {
            Err(parser.unsupported())
        }
    }

    /// Name of the table the statement targets.
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::Insert { table, .. }
            | Self::Delete { table }
            | Self::Select { table, .. }
            | Self::Count { table } => table,
        }
    }

    pub const fn statement_type(&self) -> StatementType {
        match self {
            Self::CreateTable { .. } | Self::DropTable { .. } => StatementType::Ddl,
            Self::Insert { .. } | Self::Delete { .. } => StatementType::Mutation,
            Self::Select { .. } | Self::Count { .. } => StatementType::Query,
        }
    }

    /// True if the statement produces a result set.
    pub const fn is_fetchable(&self) -> bool {
        matches!(self, Self::Select { .. } | Self::Count { .. })
    }
}

fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in sql.chars() {
        if c.is_whitespace() || matches!(c, '(' | ')' | ',' | '*' | '?' | ';') {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            if !c.is_whitespace() && c != ';' {
                tokens.push(c.to_string());
            }
        } else {
            word.push(c);
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<String>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            tokens: tokenize(sql),
            pos: 0,
        }
    }

    fn unsupported(&self) -> Error {
        Error::Unsupported(self.sql.trim().to_string())
    }

    fn is_done(&self) -> bool {
        self.pos == self.tokens.len()
    }

    fn peek_is(&self, keyword: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|token| token.eq_ignore_ascii_case(keyword))
    }

    fn accept(&mut self, keyword: &str) -> bool {
        let found = self.peek_is(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, keyword: &str) -> Result<(), Error> {
        if self.accept(keyword) {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }

    fn word(&mut self) -> Result<String, Error> {
        match self.tokens.get(self.pos) {
            Some(token) if token.starts_with(|c: char| c.is_alphanumeric() || c == '_') => {
                self.pos += 1;
                Ok(token.clone())
            }
            _ => Err(self.unsupported()),
        }
    }

    fn table(&mut self) -> Result<String, Error> {
        Ok(self.word()?.to_ascii_lowercase())
    }

    fn statement(&mut self) -> Result<Statement, Error> {
        if self.accept("CREATE") {
            self.create()
        } else if self.accept("DROP") {
            self.expect("TABLE")?;
            Ok(Statement::DropTable {
                table: self.table()?,
            })
        } else if self.accept("INSERT") {
            self.insert()
        } else if self.accept("DELETE") {
            self.expect("FROM")?;
            Ok(Statement::Delete {
                table: self.table()?,
            })
        } else if self.accept("SELECT") {
            self.select()
        } else {
            Err(self.unsupported())
        }
    }

    fn create(&mut self) -> Result<Statement, Error> {
        let table_type = [
            ("LOG", TableType::Log),
            ("FIXED", TableType::Fixed),
            ("VOLATILE", TableType::Volatile),
            ("LOOKUP", TableType::Lookup),
            ("KEYVALUE", TableType::KeyValue),
            ("TAG", TableType::Tag),
        ]
        .into_iter()
        .find_map(|(keyword, table_type)| self.accept(keyword).then_some(table_type))
        .unwrap_or_default();
        self.expect("TABLE")?;
        let table = self.table()?;

        self.expect("(")?;
        let mut columns = Vec::new();
        loop {
            let name = self.word()?.to_ascii_lowercase();
            let column_type: ColumnType = self.word()?.parse()?;
            let taken = columns.iter().any(|c: &Column| c.name == name);
            if taken || name.eq_ignore_ascii_case(ARRIVAL_TIME) {
                return Err(self.unsupported());
            }
            columns.push(Column::new(name, column_type));
            if !self.accept(",") {
                break;
            }
        }
        self.expect(")")?;

        Ok(Statement::CreateTable {
            table,
            table_type,
            columns: columns.into(),
        })
    }

    fn insert(&mut self) -> Result<Statement, Error> {
        self.expect("INTO")?;
        let table = self.table()?;
        self.expect("VALUES")?;
        self.expect("(")?;
        let mut placeholders = 0;
        loop {
            self.expect("?")?;
            placeholders += 1;
            if !self.accept(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok(Statement::Insert {
            table,
            placeholders,
        })
    }

    fn select(&mut self) -> Result<Statement, Error> {
        if self.accept("COUNT") {
            self.expect("(")?;
            self.expect("*")?;
            self.expect(")")?;
            self.expect("FROM")?;
            return Ok(Statement::Count {
                table: self.table()?,
            });
        }

        let arrival_time = self.accept(ARRIVAL_TIME);
        if arrival_time {
            self.expect(",")?;
        }
        self.expect("*")?;
        self.expect("FROM")?;
        let table = self.table()?;
        let limit = if self.accept("LIMIT") {
            let word = self.word()?;
            Some(word.parse::<usize>().map_err(|_| self.unsupported())?)
        } else {
            None
        };
        Ok(Statement::Select {
            table,
            arrival_time,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table() {
        let statement =
            Statement::parse("create tag table Sensors (name string, time datetime, value double);")
                .unwrap();
        let Statement::CreateTable {
            table,
            table_type,
            columns,
        } = statement
        else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(table, "sensors");
        assert_eq!(table_type, TableType::Tag);
        assert_eq!(columns.names(), vec!["name", "time", "value"]);
        assert_eq!(
            columns.types(),
            vec![ColumnType::String, ColumnType::Datetime, ColumnType::Double]
        );
    }

    #[test]
    fn test_create_defaults_to_log_table() {
        let statement = Statement::parse("CREATE TABLE t (id int64)").unwrap();
        assert!(matches!(
            statement,
            Statement::CreateTable {
                table_type: TableType::Log,
                ..
            }
        ));
        assert_eq!(statement.statement_type(), StatementType::Ddl);
    }

    #[test]
    fn test_unknown_column_type() {
        let err = Statement::parse("CREATE TABLE t (id decimal)").unwrap_err();
        assert!(matches!(
            err,
            Error::Spi(tabular_spi::Error::UnknownType(ref tag)) if tag == "decimal"
        ));
    }

    #[test]
    fn test_insert_counts_placeholders() {
        assert_eq!(
            Statement::parse("INSERT INTO t VALUES (?, ?,?)").unwrap(),
            Statement::Insert {
                table: "t".to_string(),
                placeholders: 3
            }
        );
    }

    #[test]
    fn test_select_forms() {
        assert_eq!(
            Statement::parse("SELECT * FROM t LIMIT 5").unwrap(),
            Statement::Select {
                table: "t".to_string(),
                arrival_time: false,
                limit: Some(5)
            }
        );
        assert_eq!(
            Statement::parse("select _arrival_time, * from T").unwrap(),
            Statement::Select {
                table: "t".to_string(),
                arrival_time: true,
                limit: None
            }
        );
        let count = Statement::parse("SELECT COUNT(*) FROM t").unwrap();
        assert!(count.is_fetchable());
        assert_eq!(count.table(), "t");
    }

    #[test]
    fn test_unsupported() {
        for sql in [
            "UPDATE t SET a = 1",
            "SELECT a FROM t",
            "SELECT * FROM t LIMIT many",
            "DELETE FROM t WHERE a = 1",
            "CREATE TABLE t (a int32, a int64)",
            "",
        ] {
            assert!(
                matches!(Statement::parse(sql), Err(Error::Unsupported(_))),
                "{sql}"
            );
        }
    }
}
