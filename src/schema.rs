//! The user's target column schema.
//!
//! A [`ColumnSchema`] is the ordered list of output field names. Its order is
//! significant everywhere: it is echoed verbatim into the extraction prompt,
//! fixes the field order of every [`crate::output::TransactionRecord`], and
//! becomes the CSV header.

use crate::error::StatementError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Semantic type inferred from a column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Number,
}

impl ColumnKind {
    /// Name used for this kind in the prompt's JSON example.
    pub fn json_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "string",
            ColumnKind::Number => "float",
        }
    }
}

const NUMERIC_KEYWORDS: [&str; 6] = ["withdraw", "deposit", "balance", "amount", "credit", "debit"];

/// Infer a column's kind from its name.
///
/// Anything mentioning a date is text even when it also mentions an amount
/// keyword ("Balance Date"); the numeric keywords are checked second.
pub fn infer_kind(column: &str) -> ColumnKind {
    let col = column.to_lowercase();
    if col.contains("date") {
        ColumnKind::Text
    } else if NUMERIC_KEYWORDS.iter().any(|kw| col.contains(kw)) {
        ColumnKind::Number
    } else {
        ColumnKind::Text
    }
}

/// Ordered, duplicate-free list of target column names.
///
/// Deserialisation goes through the same checks as [`ColumnSchema::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColumnSchema")]
pub struct ColumnSchema {
    names: Vec<String>,
    /// Caller-supplied identifiers keyed by column name, in schema order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ids: Vec<(String, Value)>,
}

impl ColumnSchema {
    /// Validate and build a schema from column names.
    ///
    /// Rejects an empty list, blank names and duplicates. Names are kept
    /// verbatim (no trimming) because they are echoed into the output.
    pub fn new<I, S>(names: I) -> Result<Self, StatementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        validate_names(&names)?;
        Ok(Self {
            names,
            ids: Vec::new(),
        })
    }

    /// Re-run the constructor checks on an existing schema.
    pub fn validate(&self) -> Result<(), StatementError> {
        validate_names(&self.names)
    }

    /// Parse a schema from a JSON array.
    ///
    /// Two element shapes are accepted and may be mixed:
    /// - plain strings: `["Date", "Amount"]`
    /// - upload-form objects: `[{"id": 1, "name": "Date"}]`; objects without a
    ///   `name` are skipped, and an `id` is kept in [`Self::column_ids`].
    pub fn from_json(raw: &str) -> Result<Self, StatementError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| StatementError::InvalidColumns {
                reason: format!("not valid JSON: {e}"),
            })?;
        let Value::Array(items) = value else {
            return Err(StatementError::InvalidColumns {
                reason: "columns must be a JSON array".into(),
            });
        };

        let mut names = Vec::with_capacity(items.len());
        let mut ids = Vec::new();
        for item in items {
            match item {
                Value::String(name) => names.push(name),
                Value::Object(obj) => {
                    let Some(name) = obj.get("name") else {
                        continue;
                    };
                    let Some(name) = name.as_str() else {
                        return Err(StatementError::InvalidColumns {
                            reason: "column 'name' must be a string".into(),
                        });
                    };
                    if let Some(id) = obj.get("id") {
                        ids.push((name.to_string(), id.clone()));
                    }
                    names.push(name.to_string());
                }
                other => {
                    return Err(StatementError::InvalidColumns {
                        reason: format!("unsupported column entry: {other}"),
                    })
                }
            }
        }

        let mut schema = Self::new(names)?;
        schema.ids = ids;
        Ok(schema)
    }

    /// Column names in schema order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Identifiers supplied alongside names by the upload form, if any.
    pub fn column_ids(&self) -> &[(String, Value)] {
        &self.ids
    }

    /// `(name, kind)` pairs in schema order.
    pub fn kinds(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.names.iter().map(|n| (n.as_str(), infer_kind(n)))
    }

    /// Render the JSON shape example embedded in the extraction prompt.
    ///
    /// ```text
    /// [
    ///   {
    ///     "Date": "string",
    ///     "Amount": "float"
    ///   },
    ///   ...
    /// ]
    /// ```
    pub fn json_example(&self) -> String {
        let lines: Vec<String> = self
            .kinds()
            .map(|(name, kind)| {
                let key = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""));
                format!("    {key}: \"{}\"", kind.json_type())
            })
            .collect();
        format!("[\n  {{\n{}\n  }},\n  ...\n]", lines.join(",\n"))
    }
}

fn validate_names(names: &[String]) -> Result<(), StatementError> {
    if names.is_empty() {
        return Err(StatementError::InvalidColumns {
            reason: "columns must be a non-empty list".into(),
        });
    }
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(StatementError::InvalidColumns {
                reason: "column names must not be blank".into(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(StatementError::InvalidColumns {
                reason: format!("duplicate column '{name}'"),
            });
        }
    }
    Ok(())
}

/// Wire form of [`ColumnSchema`], validated on the way in.
#[derive(Deserialize)]
struct RawColumnSchema {
    names: Vec<String>,
    #[serde(default)]
    ids: Vec<(String, Value)>,
}

impl TryFrom<RawColumnSchema> for ColumnSchema {
    type Error = StatementError;

    fn try_from(raw: RawColumnSchema) -> Result<Self, Self::Error> {
        let mut schema = ColumnSchema::new(raw.names)?;
        schema.ids = raw.ids;
        Ok(schema)
    }
}

// ── Bank presets ─────────────────────────────────────────────────────────

const GENERIC_COLUMNS: &[&str] = &["Date", "Description", "Debit", "Credit", "Balance"];

const BANK_PRESETS: &[(&str, &[&str])] = &[
    (
        "AXIS_BANK",
        &["Tran Date", "Chq No", "Particulars", "Debit", "Credit", "Balance", "Init. Br"],
    ),
    (
        "AU_BANK",
        &[
            "Date",
            "Description/Narration",
            "Value date",
            "Chq./Ref. No.",
            "Debit(Dr.)",
            "Credit(Cr.)",
            "Balance",
        ],
    ),
    (
        "BOB_BANK",
        &[
            "Serial No",
            "Transaction Date",
            "Value Date",
            "Description",
            "Cheque Number",
            "Debit",
            "Credit",
            "Balance",
        ],
    ),
    (
        "BOI_BANK",
        &["Transaction Date", "Instrument Id", "Narration", "Debit", "Credit", "Balance"],
    ),
    (
        "CENTRAL_BANK",
        &["Value Date", "Post Date", "Details", "Chq.No.", "Debit", "Credit", "Balance"],
    ),
    (
        "HDFC_BANK",
        &[
            "Date",
            "Narration",
            "Chq./Ref.No.",
            "Value Dt",
            "Withdrawal Amt.",
            "Deposit Amt.",
            "Closing Balance",
        ],
    ),
    ("ICICI_BANK", &["Date", "Description", "Amount", "Type"]),
    (
        "INDUSLND_BANK",
        &["DATE", "PARTICULARS", "CHQ.NO.", "WITHDRAWALS", "DEPOSITS", "BALANCE"],
    ),
    (
        "SBI_BANK",
        &[
            "Txn Date",
            "Value Date",
            "Description",
            "Ref No./Cheque No.",
            "Debit",
            "Credit",
            "Balance",
        ],
    ),
    ("GENERIC", GENERIC_COLUMNS),
];

/// Keys of every known bank preset, `GENERIC` last.
pub fn known_banks() -> Vec<&'static str> {
    BANK_PRESETS.iter().map(|(k, _)| *k).collect()
}

/// Whether `bank` names a preset (case-insensitive).
pub fn is_known_bank(bank: &str) -> bool {
    BANK_PRESETS.iter().any(|(k, _)| k.eq_ignore_ascii_case(bank))
}

/// Suggested columns for a bank key (case-insensitive), or the generic set.
pub fn suggested_columns(bank: Option<&str>) -> Vec<&'static str> {
    let wanted = bank.map(str::to_uppercase);
    wanted
        .as_deref()
        .and_then(|w| BANK_PRESETS.iter().find(|(k, _)| *k == w))
        .map(|(_, cols)| cols.to_vec())
        .unwrap_or_else(|| GENERIC_COLUMNS.to_vec())
}
