use std::collections::HashSet;

/// Decides whether a user statement returns a result set or affects rows.
pub trait StatementClassifier: Send + Sync {
    fn is_read_only(&self, sql: &str) -> bool;
}

/// Classifies by the statement's first keyword against a fixed set.
pub struct LeadingKeyword {
    keywords: HashSet<String>,
}

impl LeadingKeyword {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.to_ascii_uppercase())
                .collect(),
        }
    }
}

impl Default for LeadingKeyword {
    /// `SELECT` and `SHOW` read; everything else goes down the affecting path.
    fn default() -> Self {
        Self::new(vec!["SELECT".to_string(), "SHOW".to_string()])
    }
}

impl StatementClassifier for LeadingKeyword {
    fn is_read_only(&self, sql: &str) -> bool {
        let upper = sql.trim_start().to_ascii_uppercase();
        self.keywords.iter().any(|k| upper.starts_with(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_and_show_read_regardless_of_case_and_leading_space() {
        let c = LeadingKeyword::default();
        assert!(c.is_read_only("  select * from t"));
        assert!(c.is_read_only("SHOW TABLES"));
        assert!(c.is_read_only("\n\tShow databases"));
    }

    #[test]
    fn everything_else_mutates() {
        let c = LeadingKeyword::default();
        assert!(!c.is_read_only("UPDATE t SET x=1"));
        assert!(!c.is_read_only("DELETE FROM t"));
        assert!(!c.is_read_only("insert into t values (1)"));
        assert!(!c.is_read_only("WITH x AS (SELECT 1) SELECT * FROM x"));
    }
}
