use crate::models::Row;

/// Which grading template a prompt was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// Binary judgment against a reference answer
    Reference,
    /// Five-tier rubric using the judge's own knowledge
    Rubric,
}

/// Builds grading prompts, optionally ignoring reference answers
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    honor_reference: bool,
}

impl PromptBuilder {
    pub fn new(honor_reference: bool) -> Self {
        Self { honor_reference }
    }

    /// Template selected for a row under this builder's policy
    pub fn variant(&self, row: &Row) -> PromptVariant {
        if self.honor_reference && row.reference_text().is_some() {
            PromptVariant::Reference
        } else {
            PromptVariant::Rubric
        }
    }

    /// Build the prompt text for a row
    pub fn build(&self, row: &Row) -> String {
        if self.honor_reference {
            build_prompt(row)
        } else {
            rubric_prompt(&row.question, &row.answer)
        }
    }
}

/// Build a prompt honouring the row's reference answer when present
pub fn build_prompt(row: &Row) -> String {
    match row.reference_text() {
        Some(reference) => reference_prompt(&row.question, reference, &row.answer),
        None => rubric_prompt(&row.question, &row.answer),
    }
}

const OUTPUT_FORMAT: &str = r#"Output format (strictly follow this, no deviation):
{"student": SCORE}
{"reason": "core reason, max 150 characters"}"#;

fn reference_prompt(question: &str, reference: &str, answer: &str) -> String {
    format!(
        r#"You are an internationally recognized medical professor with extensive experience in clinical evaluation.

Your task:
Evaluate the student's answer by comparing it with the provided reference answer, considering medical accuracy, completeness, and relevance.

Scoring rules:
- 1.0: The student's answer is medically correct, matches the reference in meaning, and contains no major omissions.
- 0.0: The student's answer is incorrect, contradicts the reference, omits essential points, or contains harmful medical misinformation.

Strict output requirements:
1. Output exactly two JSON objects in order, each on its own line:
   {{"student": SCORE}}
   {{"reason": "REASON"}}
2. SCORE must be either 0.0 or 1.0.
3. REASON should be concise (preferably under 150 characters) and clearly state the core basis for the score.
4. Do NOT add any other text, explanation, or formatting.
5. If unsure, make the best judgment based on medical accuracy and the reference answer.

{OUTPUT_FORMAT}

Question: {question}
Reference answer: {reference}
Student's answer: {answer}"#
    )
}

fn rubric_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"You are an internationally recognized medical professor with extensive experience in evaluating clinical answers.

Your task is to score the student's answer based on professional medical accuracy, completeness, and relevance.

Scoring criteria:
- 1.0 point: Completely correct, medically accurate, and comprehensive answer.
- 0.8-0.9 points: Basically correct with only minor omissions or slight lack of detail.
- 0.5-0.7 points: Partially correct but missing key points or containing notable inaccuracies.
- 0.2-0.4 points: Mostly incorrect but containing a few medically relevant elements.
- 0.0-0.1 points: Completely incorrect, irrelevant, or potentially misleading in a medical context.

Strict output requirements:
1. Output must contain exactly two JSON objects in the following order, each on its own line:
   {{"student": SCORE}}
   {{"reason": "REASON"}}
2. SCORE must be a single decimal number between 0 and 1 (inclusive), with one decimal place.
3. REASON should be concise (preferably under 150 characters) and clearly state the core basis for the score.
4. Do NOT add any other text, explanation, punctuation, or formatting outside these two JSON lines.
5. If unsure, make the best judgment based on the scoring criteria.

{OUTPUT_FORMAT}

Question: {question}
Student's answer: {answer}"#
    )
}
