use log::trace;

use crate::ctx::Ctx;
use crate::doc::Document;
use crate::error::{Error, Result};

/// Expand a naming pattern into a document name.
///
/// Parts are separated by `.`:
/// - a run of `#` is the next number of the series keyed by the name built
///   so far, zero-padded to the length of the run;
/// - `YY`, `YYYY`, `MM` and `DD` are taken from the request date;
/// - anything else is copied as is.
///
/// A pattern without `#` gets `.#####` appended.
pub fn make_autoname(ctx: &Ctx<'_>, pattern: &str) -> Result<String> {
    let pattern = if pattern.contains('#') {
        if !pattern.contains('.') {
            return Err(Error::validation(format!(
                "Invalid naming series `{pattern}`: `.` is missing"
            )));
        }
        pattern.to_owned()
    } else {
        format!("{pattern}.#####")
    };

    let today = ctx.today();
    let mut name = String::new();
    for part in pattern.split('.') {
        match part {
            "" => {}
            "YY" => name.push_str(&today.format("%y").to_string()),
            "YYYY" => name.push_str(&today.format("%Y").to_string()),
            "MM" => name.push_str(&today.format("%m").to_string()),
            "DD" => name.push_str(&today.format("%d").to_string()),
            digits if digits.starts_with('#') => {
                let n = ctx.store().next_series(&name)?;
                let width = digits.len();
                name.push_str(&format!("{n:0width$}"));
            }
            literal => name.push_str(literal),
        }
    }

    trace!("Named `{name}` from `{pattern}`");
    Ok(name)
}

/// Name an ISO Form after its ISO number: `ISO/<iso_number>/00001`.
pub fn iso_form_autoname(ctx: &Ctx<'_>, doc: &mut Document) -> Result<String> {
    let iso_number = doc.get("iso_number").to_text();
    let iso_number = iso_number.trim();
    if iso_number.is_empty() {
        return Err(Error::validation("ISO Number is required to name an ISO Form"));
    }

    let name = make_autoname(ctx, &format!("ISO/{iso_number}/.#####"))?;
    doc.set_name(name.clone());
    Ok(name)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::doc::DocType;
    use crate::store::memory::MemoryStore;

    fn ctx(store: &MemoryStore) -> Ctx<'_> {
        Ctx::builder("jane", store)
            .today(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
            .build()
    }

    #[test]
    fn series_per_prefix() {
        crate::init_log();

        let store = MemoryStore::new();
        let ctx = ctx(&store);
        assert_eq!(make_autoname(&ctx, "SO-.YY.MM.-.####").unwrap(), "SO-2403-0001");
        assert_eq!(make_autoname(&ctx, "SO-.YY.MM.-.####").unwrap(), "SO-2403-0002");
        assert_eq!(make_autoname(&ctx, "PO-.YYYY.DD.-.###").unwrap(), "PO-202409-001");
        assert_eq!(make_autoname(&ctx, "PINV").unwrap(), "PINV00001");
    }

    #[test]
    fn series_without_separator_is_invalid() {
        let store = MemoryStore::new();
        assert!(matches!(
            make_autoname(&ctx(&store), "SO-#####"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn iso_form_names() {
        let store = MemoryStore::new();
        let ctx = ctx(&store);
        let iso_form = || Document::new(DocType::new("ISO Form").unwrap());

        let mut first = iso_form().with("iso_number", "9001");
        assert_eq!(iso_form_autoname(&ctx, &mut first).unwrap(), "ISO/9001/00001");
        assert_eq!(first.name(), Some("ISO/9001/00001"));

        let mut second = iso_form().with("iso_number", "9001");
        assert_eq!(iso_form_autoname(&ctx, &mut second).unwrap(), "ISO/9001/00002");

        let mut other = iso_form().with("iso_number", 14001);
        assert_eq!(iso_form_autoname(&ctx, &mut other).unwrap(), "ISO/14001/00001");

        for mut missing in [iso_form(), iso_form().with("iso_number", " ")] {
            assert!(matches!(
                iso_form_autoname(&ctx, &mut missing),
                Err(Error::Validation(_))
            ));
            assert!(missing.is_new());
        }
    }
}
