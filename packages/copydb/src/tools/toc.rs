//! Archive table of contents, as printed by `pg_restore --list`.
//!
//! ```text
//! ;
//! ; Archive created at 2024-03-01 10:12:44 UTC
//! ;
//! 3; 2615 2200 SCHEMA - public postgres
//! 215; 1259 16386 INDEX public orders_customer_idx app
//! ```
//!
//! Only the leading `dumpId; catalogOid objectOid` triple is interpreted.

use crate::error::{CopyError, Result};

/// One object in a dump's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position used by pg_restore to select or skip the object
    pub dump_id: i32,
    /// OID of the catalog the object lives in (pg_class, pg_constraint, ...)
    pub catalog_oid: u32,
    /// Stable identifier of the object itself
    pub object_oid: u32,
    /// Rest of the listing line, for diagnostics only
    pub description: String,
}

impl ArchiveEntry {
    pub fn new(dump_id: i32, catalog_oid: u32, object_oid: u32) -> Self {
        Self {
            dump_id,
            catalog_oid,
            object_oid,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Parse `pg_restore --list` output, keeping listing order.
pub fn parse_listing(output: &str) -> Result<Vec<ArchiveEntry>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<ArchiveEntry> {
    let invalid = || CopyError::InvalidListing {
        line: line.to_string(),
    };

    let (dump_id, rest) = line.split_once(';').ok_or_else(invalid)?;
    let dump_id: i32 = dump_id.trim().parse().map_err(|_| invalid())?;

    let mut fields = rest.trim_start().splitn(3, char::is_whitespace);
    let catalog_oid: u32 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(invalid)?;
    let object_oid: u32 = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(invalid)?;
    let description = fields.next().unwrap_or("").trim().to_string();

    Ok(ArchiveEntry::new(dump_id, catalog_oid, object_oid).with_description(description))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = ";
; Archive created at 2024-03-01 10:12:44 UTC
;     dbname: shop
;
; Selected TOC Entries:
;
214; 1259 16385 INDEX public orders_pkey app
215; 1259 16386 INDEX public orders_customer_idx app
3051; 2606 16390 FK CONSTRAINT public orders orders_customer_fkey app
";

    #[test]
    fn test_parse_listing_skips_comments_and_keeps_order() {
        let entries = parse_listing(LISTING).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            ArchiveEntry::new(214, 1259, 16385).with_description("INDEX public orders_pkey app")
        );
        assert_eq!(
            (entries[2].dump_id, entries[2].catalog_oid, entries[2].object_oid),
            (3051, 2606, 16390)
        );
        assert_eq!(
            entries[2].description,
            "FK CONSTRAINT public orders orders_customer_fkey app"
        );
    }

    #[test]
    fn test_parse_listing_without_description() {
        let entries = parse_listing("7; 1259 42\n").unwrap();
        assert_eq!(entries, vec![ArchiveEntry::new(7, 1259, 42)]);
    }

    #[test]
    fn test_parse_listing_rejects_garbage() {
        let err = parse_listing("214; 1259 INDEX public orders_pkey app\n").unwrap_err();
        assert!(matches!(err, CopyError::InvalidListing { .. }));

        assert!(parse_listing("not a toc line\n").is_err());
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_listing(";\n; nothing selected\n\n").unwrap().is_empty());
    }
}
