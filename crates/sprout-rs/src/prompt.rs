//! System prompts for tutoring turns, response analysis, images and lessons.
//!
//! Every prompt is a pure function of its inputs. Guidance turns go through
//! [`LearningTurn::system_prompt`], which picks one template per
//! [`ResponseType`] and appends the final-step addendum when the student has
//! reached the last step.
//!
//! Fields are interpolated verbatim. Context text supplied by the client ends
//! up inside the system prompt unescaped.

use serde::{Deserialize, Serialize};

/// The kind of guidance the tutor should give on this turn.
///
/// Parsing is total: anything that is not `hint`, `clarification` or
/// `encouragement` (case-insensitive) becomes [`ResponseType::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum ResponseType {
    Hint,
    Clarification,
    Encouragement,
    #[default]
    Default,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Hint => "hint",
            ResponseType::Clarification => "clarification",
            ResponseType::Encouragement => "encouragement",
            ResponseType::Default => "default",
        }
    }
}

impl From<&str> for ResponseType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hint" => ResponseType::Hint,
            "clarification" => ResponseType::Clarification,
            "encouragement" => ResponseType::Encouragement,
            _ => ResponseType::Default,
        }
    }
}

impl From<String> for ResponseType {
    fn from(s: String) -> Self {
        ResponseType::from(s.as_str())
    }
}

impl From<ResponseType> for String {
    fn from(rt: ResponseType) -> Self {
        rt.as_str().to_string()
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a guided learning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearningTurn {
    /// What the student just said.
    pub message: String,
    /// The question the session started from.
    pub user_query: String,
    pub subject: String,
    pub current_step: i64,
    pub total_steps: i64,
    /// Transcript so far.
    pub context: String,
    pub response_type: ResponseType,
}

impl LearningTurn {
    /// `current_step >= total_steps`. Equality counts as the final step.
    pub fn is_final_step(&self) -> bool {
        is_final_step(self.current_step, self.total_steps)
    }

    /// System prompt for this turn.
    pub fn system_prompt(&self) -> String {
        build_prompt(
            self.response_type,
            &self.subject,
            self.current_step,
            self.total_steps,
            &self.context,
        )
    }

    /// User message framing the original question and the student's reply.
    pub fn user_message(&self) -> String {
        student_turn_message(&self.user_query, &self.message)
    }

    /// The context for the next turn: this turn's exchange appended to the
    /// existing transcript. Nothing is ever dropped.
    pub fn updated_context(&self, tutor_reply: &str) -> String {
        format!(
            "{}\n\nStudent: {}\n\nTutor: {tutor_reply}",
            self.context, self.message
        )
    }
}

/// Whether a step index is the final one.
pub fn is_final_step(current_step: i64, total_steps: i64) -> bool {
    current_step >= total_steps
}

/// Build the system prompt for a guidance turn.
pub fn build_prompt(
    response_type: ResponseType,
    subject: &str,
    current_step: i64,
    total_steps: i64,
    context: &str,
) -> String {
    let mut prompt = match response_type {
        ResponseType::Hint => hint_template(subject, current_step, total_steps, context),
        ResponseType::Clarification => {
            clarification_template(subject, current_step, total_steps, context)
        }
        ResponseType::Encouragement => {
            encouragement_template(subject, current_step, total_steps, context)
        }
        ResponseType::Default => default_template(subject, current_step, total_steps, context),
    };
    if is_final_step(current_step, total_steps) {
        prompt.push_str(FINAL_STEP_ADDENDUM);
    }
    prompt
}

/// Appended to every guidance prompt on the final step.
pub const FINAL_STEP_ADDENDUM: &str = "

This is the FINAL STEP in the learning process.

In addition to your regular guidance:
1. Summarize what they've learned through this process
2. Celebrate their accomplishment
3. Suggest how they might apply this knowledge
4. End with a positive, encouraging note";

fn hint_template(subject: &str, current_step: i64, total_steps: i64, context: &str) -> String {
    format!(
        "You are an AI tutor helping a student with a {subject} problem.

The student is on step {current_step} of {total_steps}.

Current context: \"{context}\"

The student has responded and needs a HINT to move forward. Do NOT give them the answer!

Your response should:
1. Acknowledge their answer with specific encouragement
2. Provide a gentle hint that guides them in the right direction
3. Ask a thought-provoking question that helps them discover the next step themselves
4. Use age-appropriate language and examples

Important guidelines:
- NEVER solve the problem for them
- Focus on process and thinking skills
- Build confidence through guided discovery
- Keep your response friendly, encouraging, and concise"
    )
}

fn clarification_template(
    subject: &str,
    current_step: i64,
    total_steps: i64,
    context: &str,
) -> String {
    format!(
        "You are an AI tutor helping a confused student with a {subject} problem.

The student is on step {current_step} of {total_steps} and seems confused.

Current context: \"{context}\"

Your response should:
1. Reassure them that confusion is part of learning
2. Clarify the concept they're struggling with using simple examples
3. Break down the step into smaller, more manageable parts
4. Provide a structured approach to help them get unstuck

Important guidelines:
- Use very clear, simple language
- Explain concepts in multiple ways
- Use metaphors or visual examples when possible
- Keep your response patient, kind, and supportive"
    )
}

fn encouragement_template(
    subject: &str,
    current_step: i64,
    total_steps: i64,
    context: &str,
) -> String {
    format!(
        "You are an AI tutor celebrating a student's progress with a {subject} problem.

The student is on step {current_step} of {total_steps} and has provided a good answer.

Current context: \"{context}\"

Your response should:
1. Provide specific praise for what they did well
2. Reinforce the concept they just demonstrated
3. Connect this knowledge to the bigger picture
4. Present the next challenge with enthusiasm

Important guidelines:
- Be genuinely excited about their progress
- Highlight specific aspects of their thinking that were effective
- Build momentum and curiosity for the next step
- Keep your response upbeat and motivating"
    )
}

fn default_template(subject: &str, current_step: i64, total_steps: i64, context: &str) -> String {
    format!(
        "You are an AI tutor helping a student with a {subject} problem.

The student is on step {current_step} of {total_steps}.

Current context: \"{context}\"

Provide guidance that helps them learn, but never give direct answers."
    )
}

/// User message for a guidance turn.
pub fn student_turn_message(user_query: &str, message: &str) -> String {
    format!("Original question: \"{user_query}\"\n\nStudent's message: \"{message}\"")
}

// ── Response analysis ──────────────────────────────────────────────

/// System prompt for analysing a student's answer.
pub fn analysis_prompt(
    subject: &str,
    current_step: i64,
    total_steps: i64,
    context: &str,
) -> String {
    format!(
        "You are an AI educational assistant analyzing a student's response.

IMPORTANT: Never provide direct answers to educational problems. \
Instead, provide hints and guidance.

The student is working on step {current_step} of {total_steps} in a {subject} problem.

The context of this step is: \"{context}\"

Analyze their response based on:
1. Correctness (is the student on the right track?)
2. Confusion level (how confused do they seem, on a scale of 0-10?)
3. Any specific misconceptions

Record your analysis by calling the record_analysis function. \
If you cannot call it, reply with JSON of the form:
{{\"is_correct\": true/false, \"confusion_level\": 0-10, \"misconceptions\": [\"...\"], \
\"feedback\": \"Educational feedback with hints (not answers)\"}}

Remember: Your goal is to help them learn and think for themselves, \
not to solve the problem for them."
    )
}

/// User message carrying the student's answer.
pub fn student_response_message(student_response: &str) -> String {
    format!("Student's response: \"{student_response}\"")
}

// ── Images ─────────────────────────────────────────────────────────

/// System prompt for vision analysis of an uploaded image.
pub const IMAGE_ANALYSIS_PROMPT: &str = "\
You are an educational AI tutor for children. A student has uploaded an image.

Identify what's in the image and determine if it's educational content like:
1. A math problem
2. A science question
3. A reading/writing task
4. Other educational content

If it's educational content:
- DON'T solve the problem directly
- Provide educational guidance and hints that help the student learn
- Break down the process into steps they can follow
- Use age-appropriate language
- Ask questions to prompt their thinking

If it's not clearly educational content:
- Just describe what you see and ask if they need help with anything specific

Format your response to be engaging and encouraging.";

/// The question sent alongside the image.
pub const IMAGE_QUESTION: &str = "What's in this image?";

/// System prompt for learning-step generation.
pub const LEARNING_STEPS_SYSTEM_PROMPT: &str = "\
You are an educational assistant creating step-by-step guidance for a child. \
Never provide direct answers, only hints and educational guidance.";

/// User message asking for 3-5 learning steps derived from an image analysis.
pub fn learning_steps_request(analysis: &str) -> String {
    format!(
        "Based on this analysis of an educational image, create 3-5 interactive learning \
         steps that guide the child to solve it themselves: '{analysis}'"
    )
}

// ── Lessons ────────────────────────────────────────────────────────

/// System prompt for the opening step of an interactive lesson.
pub fn lesson_plan_prompt(query: &str, subject: &str, grade_level: u32) -> String {
    format!(
        "You are an educational AI tutor designing an interactive learning experience \
for a grade {grade_level} student.

The student wants to learn about: \"{query}\" in the subject of {subject}.

Create an interactive learning plan with 3-5 steps.
For each step, focus on having the student actively engage with the concepts.

IMPORTANT: Never provide direct answers to problems. Instead, guide the student through discovery.

Format your response as a single paragraph with a brief explanation of the first learning step.
This should give the student enough information to start working on the task, \
but not complete answers.

Keep your language child-friendly, engaging, and encouraging."
    )
}

/// User message opening a lesson.
pub fn lesson_opening_message(query: &str) -> String {
    format!("Help me learn about: {query}")
}

/// System prompt restricting the reply to a bare step count.
pub const LESSON_LENGTH_SYSTEM_PROMPT: &str = "\
You only respond with a number representing how many steps would be \
appropriate for this learning task, between 3 and 5.";

/// User message asking how many steps a lesson should have.
pub fn lesson_length_request(query: &str, subject: &str, grade_level: u32) -> String {
    format!(
        "How many interactive learning steps would be appropriate for a grade {grade_level} \
         student to learn about '{query}' in the subject of {subject}?"
    )
}

// ── Explanations ───────────────────────────────────────────────────

const EXPLANATION_FORMAT: &str = "Format your response as JSON with numbered steps, each \
having a title and detailed content.";

/// System prompt for a kid-friendly step-by-step explanation. Math, Reading,
/// Science and Social Studies have their own wording and example; any other
/// subject gets a generic prompt.
pub fn explanation_prompt(subject: &str) -> String {
    let (intro, example) = match subject {
        "Math" => (
            "You are explaining a math problem to a 2nd grader. Break it down into simple, fun \
             steps that a young child would understand. Use simple words and examples from \
             everyday life.",
            concat!(
                r#"{"steps": [{"title": "First we count", "#,
                r#""content": "Let's count the apples one by one: 1, 2, 3!"}, "#,
                r#"{"title": "Then we add", "#,
                r#""content": "Now we put all the apples together and count them all."}]}"#,
            ),
        ),
        "Reading" => (
            "You are explaining a reading passage to a 2nd grader. Break it down into fun, simple \
             steps with clear explanations a young child would understand. Use simple words and \
             relate to things they know.",
            concat!(
                r#"{"steps": [{"title": "Who is in the story", "#,
                r#""content": "The story is about a friendly dog named Spot "#,
                r#"who loves to play."}, "#,
                r#"{"title": "What happened", "#,
                r#""content": "Spot lost his favorite toy "#,
                r#"and went on an adventure to find it."}]}"#,
            ),
        ),
        "Science" => (
            "You are explaining a science concept to a 2nd grader. Break it down into exciting, \
             simple steps with clear explanations that would make a young child curious and help \
             them understand. Use simple words and everyday examples.",
            concat!(
                r#"{"steps": [{"title": "Water is wet", "content": "When you touch water, "#,
                r#"your fingers get wet because water sticks to things!"}, "#,
                r#"{"title": "Ice is frozen water", "#,
                r#""content": "When it gets very cold, "#,
                r#"water turns hard like a rock. That's ice!"}]}"#,
            ),
        ),
        "Social Studies" => (
            "You are explaining a social studies topic to a 2nd grader. Break it down into \
             friendly, simple steps with explanations that a young child would understand. Use \
             simple words and examples from their world.",
            concat!(
                r#"{"steps": [{"title": "Communities are where we live", "#,
                r#""content": "A community is like a big neighborhood where people live, "#,
                r#"work and play together."}, "#,
                r#"{"title": "People in communities help each other", "#,
                r#""content": "In a community, we have helpers like teachers, doctors, "#,
                r#"and firefighters who keep everyone safe and happy."}]}"#,
            ),
        ),
        _ => {
            return format!(
                "You are explaining a concept to a 2nd grader. Break it down into friendly, simple \
                 steps with clear explanations a young child would understand. Use simple words \
                 and relatable examples. {EXPLANATION_FORMAT}"
            );
        }
    };
    format!("{intro} {EXPLANATION_FORMAT} For example: {example}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(response_type: ResponseType, current_step: i64, total_steps: i64) -> LearningTurn {
        LearningTurn {
            message: "I think it's 12".into(),
            user_query: "What is 7 + 5?".into(),
            subject: "Math".into(),
            current_step,
            total_steps,
            context: "Adding single digits".into(),
            response_type,
        }
    }

    #[test]
    fn response_type_parsing_is_total() {
        assert_eq!(ResponseType::from("hint"), ResponseType::Hint);
        assert_eq!(ResponseType::from("HINT"), ResponseType::Hint);
        assert_eq!(
            ResponseType::from(" Clarification "),
            ResponseType::Clarification
        );
        assert_eq!(
            ResponseType::from("encouragement"),
            ResponseType::Encouragement
        );
        assert_eq!(ResponseType::from("anything-else"), ResponseType::Default);
        assert_eq!(ResponseType::from(""), ResponseType::Default);
    }

    #[test]
    fn response_type_deserializes_unknown_as_default() {
        let rt: ResponseType = serde_json::from_str("\"socratic\"").unwrap();
        assert_eq!(rt, ResponseType::Default);
        let rt: ResponseType = serde_json::from_str("\"hint\"").unwrap();
        assert_eq!(rt, ResponseType::Hint);
    }

    #[test]
    fn unknown_type_uses_default_template() {
        let unknown = build_prompt(ResponseType::from("quiz"), "Math", 1, 3, "ctx");
        let default = build_prompt(ResponseType::Default, "Math", 1, 3, "ctx");
        assert_eq!(unknown, default);
        assert!(unknown.contains("never give direct answers"));
    }

    #[test]
    fn each_template_is_distinct_and_interpolated() {
        let prompts: Vec<String> = [
            ResponseType::Hint,
            ResponseType::Clarification,
            ResponseType::Encouragement,
            ResponseType::Default,
        ]
        .into_iter()
        .map(|rt| turn(rt, 2, 4).system_prompt())
        .collect();

        for p in &prompts {
            assert!(p.contains("Math problem"));
            assert!(p.contains("step 2 of 4"));
            assert!(p.contains("\"Adding single digits\""));
        }
        assert!(prompts[0].contains("needs a HINT"));
        assert!(prompts[1].contains("seems confused"));
        assert!(prompts[2].contains("celebrating"));
        for i in 0..prompts.len() {
            for j in (i + 1)..prompts.len() {
                assert_ne!(prompts[i], prompts[j]);
            }
        }
    }

    #[test]
    fn final_step_addendum_on_equality() {
        let p = turn(ResponseType::Hint, 3, 3).system_prompt();
        assert!(p.ends_with(FINAL_STEP_ADDENDUM));
        assert!(turn(ResponseType::Hint, 3, 3).is_final_step());
    }

    #[test]
    fn final_step_addendum_past_the_end() {
        let p = turn(ResponseType::Encouragement, 5, 3).system_prompt();
        assert!(p.contains("FINAL STEP"));
    }

    #[test]
    fn no_addendum_before_final_step() {
        for rt in [
            ResponseType::Hint,
            ResponseType::Clarification,
            ResponseType::Encouragement,
            ResponseType::Default,
        ] {
            let t = turn(rt, 2, 3);
            assert!(!t.is_final_step());
            assert!(!t.system_prompt().contains("FINAL STEP"));
        }
    }

    #[test]
    fn updated_context_appends_exchange() {
        let t = turn(ResponseType::Hint, 1, 3);
        let ctx = t.updated_context("Close! Count again.");
        assert_eq!(
            ctx,
            "Adding single digits\n\nStudent: I think it's 12\n\nTutor: Close! Count again."
        );
        let next = LearningTurn {
            context: ctx.clone(),
            ..t
        };
        assert!(next.updated_context("Yes!").starts_with(&ctx));
    }

    #[test]
    fn user_message_quotes_both_parts() {
        let t = turn(ResponseType::Hint, 1, 3);
        assert_eq!(
            t.user_message(),
            "Original question: \"What is 7 + 5?\"\n\nStudent's message: \"I think it's 12\""
        );
    }

    #[test]
    fn analysis_prompt_mentions_scale_and_function() {
        let p = analysis_prompt("Science", 2, 5, "Plants need light");
        assert!(p.contains("step 2 of 5 in a Science problem"));
        assert!(p.contains("0-10"));
        assert!(p.contains("record_analysis"));
        assert!(p.contains("\"Plants need light\""));
    }

    #[test]
    fn lesson_prompts_interpolate() {
        let p = lesson_plan_prompt("fractions", "Math", 3);
        assert!(p.contains("grade 3"));
        assert!(p.contains("\"fractions\""));
        assert!(lesson_length_request("fractions", "Math", 3).contains("'fractions'"));
    }

    #[test]
    fn explanation_prompt_per_subject() {
        let math = explanation_prompt("Math");
        assert!(math.contains("math problem to a 2nd grader"));
        assert!(math.contains("First we count"));
        assert!(explanation_prompt("Science").contains("Ice is frozen water"));
        assert!(explanation_prompt("Social Studies").contains("Communities are where we live"));

        let other = explanation_prompt("Music");
        assert!(other.contains("explaining a concept to a 2nd grader"));
        assert!(other.contains("title and detailed content"));
        assert!(!other.contains("For example"));
    }
}
