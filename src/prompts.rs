//! Instruction prompts for page extraction and review synthesis.
//!
//! Callers can override either via [`crate::config::DigestConfig`]; the
//! constants here are used only when no override is provided.

/// Default instruction for turning one research-paper page image into
/// structured Markdown.
pub const EXTRACTION_PROMPT: &str = r#"Process this research paper page image and convert it to Markdown following these requirements:

1. METADATA
   - Extract the title, author names, and publication/creation date if present
   - Use empty values for metadata that does not appear on this page

2. MAIN CONTENT
   - Convert all text to Markdown
   - If the page has a two-column layout, merge it into a single-column flow
   - Preserve the logical reading order of sections
   - Keep every equation, formula, and mathematical expression
   - Write equations in LaTeX delimited by double dollar signs, e.g. $$E=mc^2$$
   - Keep lengthy content such as theorems and propositions in full
   - Maintain section headings and subheadings
   - Preserve all citations and references

3. FIGURES AND TABLES
   - Detect every figure, diagram, and table
   - Insert each at its original position in the text flow as ![Description](placeholder_url)
   - Give each a descriptive caption

4. OUTPUT ORDER
   - Start with metadata (title, authors, date), then the main content in sequence
   - If present, put the references section at the end
   - Use standard Markdown with LaTeX equations; avoid complex layouts

5. CLEANUP
   - Remove page numbers
   - Remove running headers and footers
   - Remove journal/conference formatting elements
   - Keep only research-relevant content"#;

/// Default instruction for synthesising a review from several papers.
///
/// Each paper follows as its own message built by [`paper_message`].
pub const REVIEW_PROMPT: &str = r#"You are an expert academic reviewer. The following messages each contain one research paper converted to Markdown. Write a single review paper that synthesises them.

1. SYNTHESIS
   - Organise the review by theme, not paper by paper
   - Identify shared problems, complementary findings, and disagreements
   - Point out open questions and research gaps

2. METHODOLOGY
   - Compare the methods, datasets, and evaluation protocols across papers
   - Note the strengths and limitations of each approach

3. CITATIONS
   - Cite papers inline with numbered markers such as [1], [2]
   - Number citations in order of first appearance
   - The references list must follow exactly that numbering: entry 1 is [1], entry 2 is [2]

4. FORMATTING
   - Write the content in Markdown with a clear heading hierarchy
   - Write equations in LaTeX delimited by double dollar signs, e.g. $$E=mc^2$$
   - Do not include the references list inside the content; return it separately"#;

/// Build the message that carries one paper into the review request.
pub fn paper_message(title: &str, content: &str) -> String {
    format!("Title: {title}\n\n{content}")
}
