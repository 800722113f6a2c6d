pub const PDF_EXTENSION: &str = ".pdf";

/// Turns raw model output into the filename to save under.
///
/// Surrounding whitespace is trimmed; empty output yields `None`. `.pdf` is
/// appended unless the trimmed text already ends with it, so normalizing an
/// already-normalized name returns it unchanged.
pub fn normalize_filename(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.ends_with(PDF_EXTENSION) {
        Some(trimmed.to_string())
    } else {
        Some(format!("{}{}", trimmed, PDF_EXTENSION))
    }
}

/// Builds the generation prompt: the template followed by the extracted text.
pub fn build_prompt(template: &str, extracted_text: &str) -> String {
    let mut prompt = String::with_capacity(template.len() + extracted_text.len());
    prompt.push_str(template);
    prompt.push_str(extracted_text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_extension_once() {
        assert_eq!(
            normalize_filename("Smith_2023_DeepLearningBasics").as_deref(),
            Some("Smith_2023_DeepLearningBasics.pdf")
        );
    }

    #[test]
    fn keeps_existing_extension_after_trimming() {
        assert_eq!(
            normalize_filename("  Already_Named.pdf  \n").as_deref(),
            Some("Already_Named.pdf")
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Lee_Kim_2019_Graphs", " x.pdf ", "論文_2020_タイトル", "a.PDF"] {
            let once = normalize_filename(raw).unwrap();
            assert_eq!(normalize_filename(&once).as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn extension_check_is_case_sensitive() {
        assert_eq!(normalize_filename("a.PDF").as_deref(), Some("a.PDF.pdf"));
    }

    #[test]
    fn blank_output_is_rejected() {
        assert_eq!(normalize_filename(""), None);
        assert_eq!(normalize_filename(" \t\n"), None);
    }

    #[test]
    fn prompt_is_template_then_text_verbatim() {
        assert_eq!(build_prompt("RULES\n---\n", "page one\n"), "RULES\n---\npage one\n");
    }
}
