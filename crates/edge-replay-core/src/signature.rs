//! Base64 signature prefilter
//!
//! Edge log lines carry base64-encoded event payloads. Base64 maps each
//! 3-byte input group to a 4-character block, so how a table name shows up
//! in the encoded text depends on its byte offset modulo 3. Encoding the
//! aligned slices of the name starting at offsets 0, 1 and 2 yields three
//! fragments, one of which appears verbatim in any payload that names the
//! table.
//!
//! The filter only prefilters: it may pass lines for other tables, but it
//! never drops a line for a requested one.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Number of fragments per table, one per byte alignment
pub const SIGNATURE_CARDINALITY: usize = 3;

/// Encoded fragments identifying one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSet {
    table: String,
    fragments: [String; SIGNATURE_CARDINALITY],
}

impl SignatureSet {
    /// Derive the fragments for `table`
    pub fn for_table(table: &str) -> Self {
        let bytes = table.as_bytes();
        let fragments = std::array::from_fn(|offset| {
            let len = bytes.len().saturating_sub(offset) / 3 * 3;
            if len == 0 {
                String::new()
            } else {
                STANDARD.encode(&bytes[offset..offset + len])
            }
        });
        Self {
            table: table.to_string(),
            fragments,
        }
    }

    /// Table the fragments were derived from
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The fragments, ordered by starting offset
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Whether `line` contains at least one fragment
    pub fn matches(&self, line: &[u8]) -> bool {
        self.fragments
            .iter()
            .any(|fragment| contains(line, fragment.as_bytes()))
    }
}

/// Union of the signature sets of every requested table
#[derive(Debug, Clone, Default)]
pub struct SignatureFilter {
    fragments: Vec<Vec<u8>>,
    pass_through: bool,
}

impl SignatureFilter {
    /// Build a filter from signature sets
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a SignatureSet>) -> Self {
        let mut filter = Self::default();
        for set in sets {
            for fragment in set.fragments() {
                if fragment.is_empty() {
                    // names shorter than 3 bytes have no aligned slice
                    filter.pass_through = true;
                } else if !filter.fragments.iter().any(|f| f == fragment.as_bytes()) {
                    filter.fragments.push(fragment.as_bytes().to_vec());
                }
            }
        }
        filter
    }

    /// Build a filter straight from table names
    pub fn for_tables<S: AsRef<str>>(tables: &[S]) -> Self {
        let sets: Vec<SignatureSet> = tables
            .iter()
            .map(|t| SignatureSet::for_table(t.as_ref()))
            .collect();
        Self::from_sets(&sets)
    }

    /// Whether every line passes
    pub fn is_pass_through(&self) -> bool {
        self.pass_through
    }

    /// Distinct non-empty fragments in the union
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether `line` should be forwarded to the transformer
    pub fn matches(&self, line: &[u8]) -> bool {
        self.pass_through || self.fragments.iter().any(|f| contains(line, f))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
