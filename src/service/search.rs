/// Builds the lowercase search index stored beside profiles and QR records.
///
/// Every non-empty term is lowercased on its own and the results are joined with a single
/// space, so the lowercase form of each input is always a substring of the index.
pub fn build_search_index<I, S>(terms: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .filter_map(|term| {
            let trimmed = term.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Implemented by records that contribute terms to a search index.
pub trait Searchable {
    fn search_terms(&self) -> Vec<String>;

    fn search_index(&self) -> String {
        build_search_index(self.search_terms())
    }
}

/// Pattern for `ILIKE` matching a user supplied needle anywhere in a column.
pub fn ilike_pattern(needle: &str) -> String {
    let escaped = needle.trim().to_lowercase().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}
