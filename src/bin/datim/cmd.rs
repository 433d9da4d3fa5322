pub mod check;
pub mod generate;

/// Shared charset handling for `--output-charset`/`--imprint-charset`.
///
/// Only UTF-8 is actually implemented; other values are accepted (so scripts
/// written against locales that always pass a charset don't fail to parse)
/// but rejected at execution time with a clear error.
pub fn require_utf8(charset: &str) -> color_eyre::Result<()> {
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        Ok(())
    } else {
        Err(color_eyre::eyre::eyre!(
            "unsupported charset {charset:?}: only utf-8 is supported"
        ))
    }
}
