//! Maps raw engine failures onto the stable error taxonomy.

use tv_player_types::ErrorCategory;

use crate::engine::{EngineError, RendererCause};

/// Classify a raw playback failure. Pure and deterministic; each failure
/// record is classified exactly once.
///
/// Precedence, first match wins:
/// 1. render stage, no decoder selected, decoder enumeration failed
///    underneath → `DecoderQueryFailure`
/// 2. render stage, no decoder selected, secure decoder required →
///    `NoSecureDecoderAvailable`
/// 3. render stage, no decoder selected → `NoDecoderAvailable`
/// 4. render stage, selected decoder failed to initialize →
///    `DecoderInitializationFailure`
/// 5. source/demux stage → `SourceFailure`
/// 6. everything else → `UnknownFailure`
///
/// The secure-required check only applies once "no decoder selected" is
/// established; the match nesting makes that ordering structural.
pub fn classify(error: &EngineError) -> ErrorCategory {
    match error {
        EngineError::Renderer {
            cause: RendererCause::DecoderInit(init),
        } => match &init.decoder_name {
            None if init.caused_by_query_failure => ErrorCategory::DecoderQueryFailure,
            None if init.secure_decoder_required => ErrorCategory::NoSecureDecoderAvailable,
            None => ErrorCategory::NoDecoderAvailable,
            Some(_) => ErrorCategory::DecoderInitializationFailure,
        },
        EngineError::Source { .. } => ErrorCategory::SourceFailure,
        EngineError::Renderer { .. } | EngineError::Unexpected { .. } => {
            ErrorCategory::UnknownFailure
        }
    }
}
