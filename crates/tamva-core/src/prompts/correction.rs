//! Transcript correction prompt: clean up speech-to-text output without changing intent.
//!
//! Proper nouns are the main hazard. Names like "Aswin Ai&Ds" must survive verbatim, since
//! the router extracts chat targets from the corrected text.

/// User prompt template: `{transcript}` is replaced with the raw transcription.
pub const CORRECTION_USER_TEMPLATE: &str = r#"You are a transcription correction expert for a voice assistant. Clean up messy speech-to-text output while PRESERVING the user's original intent.

Rules:
1. DO NOT ALTER an already clear command. If the input makes sense, output it EXACTLY as it is.
2. NEVER simplify proper nouns, names, or technical terms. "Aswin Ai&Ds" stays "Aswin Ai&Ds".
3. Correct obvious mishearings (e.g. "note-look" -> "Notepad").
4. If the text is truly nonsensical, find the most plausible command within it.

Examples:
- Input: "Apply warm, open, note-look." -> Output: "Open Notepad."
- Input: "Chrome such for whether today." -> Output: "Search for weather today."
- Input: "Flirt with Aswin Ai&Ds." -> Output: "Flirt with Aswin Ai&Ds."
- Input: "send a mail to aswin that i am sick" -> Output: "send a mail to aswin that i am sick"

Output ONLY the corrected text and nothing else.

Messy: "{transcript}"
Corrected:"#;

/// Build the correction prompt for one transcription.
pub fn correction_user_prompt(transcript: &str) -> String {
    CORRECTION_USER_TEMPLATE.replace("{transcript}", transcript)
}
