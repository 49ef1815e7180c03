//! Prompts for the schema-mapping extraction call.
//!
//! Every prompt lives here so wording changes touch one file and tests can
//! inspect the exact text without a live model.

use crate::schema::ColumnSchema;

/// Render the column list the way it is echoed into the prompt:
/// `['Date', 'Narration', 'Amount']`.
pub fn column_list(schema: &ColumnSchema) -> String {
    let quoted: Vec<String> = schema
        .names()
        .iter()
        .map(|n| format!("'{}'", n.replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Build the strict extraction prompt for one page.
///
/// The page image is attached separately; the prompt carries the schema, a
/// JSON shape example derived from column kinds, and the page's reconstructed
/// table markup.
pub fn extraction_prompt(schema: &ColumnSchema, table_markup: &str) -> String {
    let columns = column_list(schema);
    let json_example = schema.json_example();
    format!(
        r#"You are a strict data extractor for bank statements.

You are provided:
1. An OCR-extracted HTML table of a bank statement page.
2. The image of that page (to correct OCR errors).
3. A fixed schema with column names: {columns}

CORE INSTRUCTIONS:
- Extract ONLY actual **transaction rows** from the HTML table.
- If the HTML is incomplete or missing data, use the image to recover the transaction rows.
- If the HTML table has incorrect row-column alignment or malformed structure, cross-check and correct it using the image.
- Use the image **only if the HTML format is empty, broken or misleading**.
- Map the data from HTML table columns to the user-specified columns as accurately as possible.
- If a user column doesn't have corresponding data in the HTML, use empty string ("") or null.

OUTPUT REQUIREMENTS:
- Return the result as a **strict JSON array**, where each element is a JSON object with keys exactly matching: {columns}
- Do NOT return a single dictionary with column names – you must return a list of dictionaries (one per transaction).
- Each row must contain meaningful transaction data – avoid filler values like column names or placeholder dashes.
- If there are **no valid transaction rows on the page, return exactly this: `[]`**.
- Do NOT wrap the output inside another object. The output must be a raw JSON array only.
- Do NOT hallucinate or invent data.
- Do NOT return explanations, comments, or non-JSON text.

DATA MAPPING GUIDELINES:
- Date columns: extract in the format present in the statement (DD/MM/YYYY, DD-MM-YYYY, etc.)
- Amount columns: extract numeric values only, remove currency symbols
- Description/Narration: include the full transaction description
- Reference numbers: include cheque and reference numbers as they appear
- Balance: extract the running balance amount

Expected Output Format:
{json_example}

HTML page content:
{table_markup}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_list_is_quoted_in_order() {
        let s = ColumnSchema::new(["Date", "Withdrawal Amt."]).unwrap();
        assert_eq!(column_list(&s), "['Date', 'Withdrawal Amt.']");
    }

    #[test]
    fn prompt_embeds_schema_example_and_markup() {
        let s = ColumnSchema::new(["Date", "Amount"]).unwrap();
        let markup = "<table><tr><td>01/01</td></tr></table>";
        let p = extraction_prompt(&s, markup);
        assert!(p.contains("['Date', 'Amount']"));
        assert!(p.contains("\"Amount\": \"float\""));
        assert!(p.ends_with(&format!("{markup}\n")));
    }
}
