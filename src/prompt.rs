const PERSONA: &str = r#"
You are an advanced AI assistant named Ada.
Engage in a helpful and thoughtful manner.

"#;

/// Sequences marking the start of a new user turn.
pub const STOP_SEQUENCES: [&str; 3] = ["\nUser:", "\n\nUser:", "User:"];

/// Builds the full model input for one turn: persona, the optional
/// document text, then the user's message inside the turn template.
pub fn compose(document: Option<&str>, user_text: &str) -> String {
    let mut body = String::from(PERSONA);
    if let Some(document) = document {
        body.push_str(&format!("PDF document:\n{document}\n\n"));
    }
    body.push_str(user_text);

    format!("User: {body}\nAssistant:")
}

pub fn stop_sequences() -> Vec<String> {
    STOP_SEQUENCES.iter().map(|s| s.to_string()).collect()
}
