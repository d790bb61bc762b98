//! SQL identifier quoting utilities
//!
//! Table and column names come from `linkfill.yml`, so every identifier is
//! validated at config load and quoted whenever it is interpolated into SQL.

/// Quote a SQL identifier to prevent injection.
///
/// Wraps the identifier in double quotes and escapes any embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use lf_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("product"), r#""product""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a potentially schema-qualified name (e.g. `schema.table`).
///
/// Splits on `.` and individually quotes each component.
///
/// # Examples
/// ```
/// use lf_core::sql_utils::quote_qualified;
/// assert_eq!(quote_qualified("product"), r#""product""#);
/// assert_eq!(quote_qualified("public.product"), r#""public"."product""#);
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Check that a configured name is a plain identifier.
///
/// Each dot-separated part must start with a letter or underscore and
/// contain only ASCII alphanumerics and underscores. When `qualified` is
/// false, dots are rejected (column names).
pub fn is_valid_identifier(name: &str, qualified: bool) -> bool {
    if name.is_empty() {
        return false;
    }
    if !qualified && name.contains('.') {
        return false;
    }
    name.split('.').all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}
