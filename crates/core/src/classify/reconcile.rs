use crate::mood::MoodLabel;

/// Combines the audio and transcript labels. When they disagree the
/// transcript label wins.
pub fn reconcile(audio: MoodLabel, text: MoodLabel) -> MoodLabel {
    if audio == text {
        audio
    } else {
        tracing::debug!(%audio, %text, "audio and text labels disagree, using text");
        text
    }
}
