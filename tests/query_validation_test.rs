//! Integration tests for query validation.
//!
//! The guard rejects empty input and destructive statements stacked after a `;`. It is not
//! a read-only filter: a single destructive statement on its own is allowed through.

use db_gateway::db::{validate_input, validate_query};
use db_gateway::error::DbError;
use db_gateway::models::{Command, CommandAction, QueryInput};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

const DESTRUCTIVE: &[&str] = &[
    "DROP TABLE",
    "DELETE FROM",
    "TRUNCATE TABLE",
    "ALTER TABLE",
    "DROP DATABASE",
];

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Randomize the case of every ASCII letter.
fn random_case(s: &str) -> String {
    let mut rng = rand::thread_rng();
    s.chars()
        .map(|c| {
            if rng.gen_bool(0.5) {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

fn random_whitespace() -> &'static str {
    [" ", "  ", "\n", "\t", " \n\t "]
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(" ")
}

#[test]
fn test_rejects_empty_and_whitespace() {
    for query in ["", " ", "\n\r\t", "     "] {
        let err = validate_query(query).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }), "{query:?}");
    }
}

#[test]
fn test_allows_ordinary_statements() {
    for query in [
        "SELECT * FROM users WHERE id = 1",
        "SELECT 1; SELECT 2",
        "INSERT INTO logs (msg) VALUES ('dropped; table')",
        "DELETE FROM sessions WHERE expired",
        "DROP TABLE scratch",
        "UPDATE t SET note = 'x'; UPDATE t SET note = 'y'",
        "HGETALL user:1",
        "SELECT * FROM t;",
    ] {
        assert!(validate_query(query).is_ok(), "{query}");
    }
}

#[test]
fn test_fuzz_stacked_destructive_statements_rejected_in_any_case() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let pattern = DESTRUCTIVE.choose(&mut rng).copied().unwrap_or("DROP TABLE");
        let (verb, object) = pattern.split_once(' ').unwrap();
        let query = format!(
            "SELECT {}{};{}{}{}{} {}",
            random_string(rng.gen_range(1..20)),
            random_whitespace(),
            random_whitespace(),
            random_case(verb),
            random_whitespace(),
            random_case(object),
            random_string(rng.gen_range(1..12)),
        );
        let err = validate_query(&query).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }), "{query:?}");
        assert!(err.to_string().contains("dangerous"), "{query:?}");
    }
}

#[test]
fn test_fuzz_random_input_never_panics() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let len = rng.gen_range(0..200);
        let query: String = (0..len)
            .map(|_| {
                // Mix of ASCII, separators and multi-byte characters
                *['a', 'Z', ';', ' ', '\n', '\'', '"', 'é', '🚀', '\0', 'D', 'T']
                    .choose(&mut rng)
                    .unwrap_or(&'a')
            })
            .collect();
        let _ = validate_query(&query);
    }
}

#[test]
fn test_command_requires_collection() {
    let blank = QueryInput::command(Command::new(" ", CommandAction::CountDocuments { filter: None }));
    assert!(matches!(validate_input(&blank), Err(DbError::InvalidInput { .. })));

    let ok = QueryInput::command(Command::new("users", CommandAction::CountDocuments { filter: None }));
    assert!(validate_input(&ok).is_ok());

    let stacked = QueryInput::native("SELECT 1; drop table users");
    assert!(validate_input(&stacked).is_err());
}
