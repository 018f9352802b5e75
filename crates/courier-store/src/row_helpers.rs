use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::message::MessageKind;

    #[test]
    fn parse_enum_success() {
        let result: Result<MessageKind, _> = parse_enum("image", "messages", "kind");
        assert_eq!(result.unwrap(), MessageKind::Image);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<MessageKind, _> = parse_enum("INVALID", "messages", "kind");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "messages", column: "kind", .. })
        ));
    }
}
