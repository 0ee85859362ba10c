//! Builds the turn controller on the worker thread from the loaded configuration.

use std::sync::Arc;
use tamva_core::{
    create_history, AssistantConfig, AssistantError, AssistantResult, AutonomousSession,
    ChatAgent, ChatClient, ChatCompletion, ChatMessageGenerator, CommandRouter, FastPathTable,
    HttpMessagingBridge, LlmCorrector, PassThroughCorrector, StatusReporter, TranscriptCorrector,
    TurnCollaborators, TurnController,
};
use tamva_voice::{
    create_best_stt, create_vad, CancellationSignal, ContinuousWake, DualVoice, MicrophoneSource,
    PhraseWakeDetector, SttBackend, UtteranceCapture, WakeDetector,
};
use tracing::{info, warn};

fn fatal(what: &str, e: impl std::fmt::Display) -> AssistantError {
    AssistantError::FatalInitError(format!("{}: {}", what, e))
}

pub fn build_controller(
    config: &AssistantConfig,
    status: StatusReporter,
    cancel: CancellationSignal,
) -> AssistantResult<TurnController> {
    let audio = &config.audio;

    let llm: Arc<dyn ChatCompletion> = Arc::new(
        ChatClient::from_config(&config.llm).map_err(|e| fatal("reasoning agent", e))?,
    );
    let corrector: Box<dyn TranscriptCorrector> = if config.llm.correction_model.trim().is_empty() {
        warn!("No correction model configured; transcripts are used as heard");
        Box::new(PassThroughCorrector)
    } else {
        Box::new(LlmCorrector::new(Arc::clone(&llm), &config.llm.correction_model))
    };

    let stt: Arc<dyn SttBackend> =
        Arc::from(create_best_stt(&config.stt).map_err(|e| fatal("transcription", e))?);
    info!("STT backend: {}", stt.name());

    let wake: Box<dyn WakeDetector> = if config.wake.enabled {
        let vad = create_vad(&audio.vad, &audio.input).map_err(|e| fatal("wake VAD", e))?;
        Box::new(PhraseWakeDetector::new(
            &config.wake,
            audio.input.frame_ms,
            vad,
            Arc::clone(&stt),
        ))
    } else {
        info!("Wake phrase disabled; listening continuously");
        Box::new(ContinuousWake)
    };

    let capture_vad = create_vad(&audio.vad, &audio.input).map_err(|e| fatal("capture VAD", e))?;
    let capture = UtteranceCapture::new(audio.capture.clone(), audio.input.frame_ms, capture_vad);

    let bridge = HttpMessagingBridge::from_config(&config.messaging)?;
    let session = AutonomousSession::new(
        Box::new(bridge),
        Box::new(ChatMessageGenerator::new(
            Arc::clone(&llm),
            &config.llm.session_model,
        )),
        config.messaging.poll_interval(),
    );

    let speaker = DualVoice::from_config(&config.tts).map_err(|e| fatal("speech output", e))?;
    let history = create_history(&config.history)?;
    let frames = MicrophoneSource::open(&audio.input).map_err(|e| fatal("microphone", e))?;

    let parts = TurnCollaborators {
        frames: Box::new(frames),
        wake,
        capture,
        stt,
        corrector,
        router: CommandRouter::new(&config.router, FastPathTable::with_defaults()),
        agent: Box::new(ChatAgent::new(llm, &config.llm.agent_model)),
        session,
        speaker: Box::new(speaker),
        history,
    };
    info!("✅ All components initialized");
    Ok(TurnController::new(
        parts,
        config.runtime.clone(),
        status,
        cancel,
    ))
}
