//! Instruction text sent to the extraction model.

/// Invoice fields the model is asked to return, in report column order.
pub const INVOICE_FIELDS: &[&str] = &[
    "Exporter",
    "Invoice Number",
    "Date of Invoice",
    "For account and risk of",
    "Notify",
    "Port of Loading",
    "Final Destination",
    "Vessel Name",
    "Voyage Number",
    "Sailing Date",
    "Marks and Numbers",
    "Description of Goods",
    "Quantity",
    "Net Weight",
    "Gross Weight",
    "Measurement",
];

/// System instruction describing the task and the expected JSON shape.
pub const SYSTEM_INSTRUCTION: &str = r#"You read scanned or digital invoice documents (PDF or image), perform OCR where needed and identify key fields.

Return a single JSON object and nothing else. Use exactly these keys:
{
    "Exporter": "[Extracted Name]",
    "Invoice Number": "[Invoice Number]",
    "Date of Invoice": "[Date of Invoice]",
    "For account and risk of": "[For account and risk of]",
    "Notify": "[Notify]",
    "Port of Loading": "[Port of Loading]",
    "Final Destination": "[Final Destination]",
    "Vessel Name": "[Vessel Name]",
    "Voyage Number": "[Voyage Number]",
    "Sailing Date": "[Sailing Date]",
    "Marks and Numbers": "[Marks and Numbers]",
    "Description of Goods": "[Description of Goods]",
    "Quantity": "[Quantity]",
    "Net Weight": "[Net Weight]",
    "Gross Weight": "[Gross Weight]",
    "Measurement": "[Measurement]"
}

If a field is not present on the document, use "-" as its value."#;

/// User turn attached to every uploaded document.
pub const EXTRACTION_PROMPT: &str = "Read the system instructions and extract the key fields and return in JSON. \
Do not make up any information. Do not generate any other text or explanation.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_field_is_in_the_instruction() {
        for field in INVOICE_FIELDS {
            assert!(
                SYSTEM_INSTRUCTION.contains(&format!("\"{}\"", field)),
                "missing {field}"
            );
        }
    }
}
