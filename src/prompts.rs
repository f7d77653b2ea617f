//! Prompts for LLM-based bank statement extraction.
//!
//! Centralising both strings here means tests can inspect them directly
//! and a wording change touches exactly one place.

/// System instruction sent with every extraction request.
pub const BANK_STATEMENT_SYSTEM_INSTRUCTION: &str = "You are a financial document parser that extracts structured data from bank statements. You must respond with valid JSON only, no markdown formatting, no code blocks, no explanations.";

const PROMPT_INSTRUCTIONS: &str = r#"Extract:
- Full name and address
- Statement date
- Starting and ending balance
- All transactions with date, description, and amount

IMPORTANT: For transaction amounts, use:
- POSITIVE amounts for deposits, credits, and money coming INTO the account
- NEGATIVE amounts for withdrawals, debits, and money going OUT of the account

Return ONLY valid JSON in this exact format (no markdown, no code blocks):
{
  "name": "",
  "address": "",
  "documentDate": "",
  "startBalance": 0,
  "endBalance": 0,
  "transactions": [
    { "date": "", "description": "", "amount": 0 }
  ],
  "isReconciled": true
}"#;

/// Build the user prompt around the extracted statement text.
///
/// The text is embedded verbatim between `"""` delimiters.
pub fn bank_statement_prompt(statement_text: &str) -> String {
    format!(
        "\nGiven the following raw bank statement text:\n\n\"\"\"\n{}\n\"\"\"\n\n{}",
        statement_text, PROMPT_INSTRUCTIONS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_text_between_delimiters() {
        let prompt = bank_statement_prompt("OPENING BALANCE 1000.00");
        assert!(prompt.contains("\"\"\"\nOPENING BALANCE 1000.00\n\"\"\""));
    }

    #[test]
    fn prompt_documents_sign_convention_and_schema() {
        let prompt = bank_statement_prompt("x");
        assert!(prompt.contains("POSITIVE amounts for deposits"));
        assert!(prompt.contains("NEGATIVE amounts for withdrawals"));
        for key in [
            "\"name\"",
            "\"address\"",
            "\"documentDate\"",
            "\"startBalance\"",
            "\"endBalance\"",
            "\"transactions\"",
            "\"isReconciled\"",
        ] {
            assert!(prompt.contains(key), "missing {key}");
        }
    }

    #[test]
    fn system_instruction_forbids_markdown() {
        assert!(BANK_STATEMENT_SYSTEM_INSTRUCTION.contains("valid JSON only"));
        assert!(BANK_STATEMENT_SYSTEM_INSTRUCTION.contains("no markdown formatting"));
    }
}
