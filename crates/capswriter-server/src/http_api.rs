//! HTTPTranscriptAPI (C8): `POST /api/transcript` accepts a whole audio
//! file, decodes it to float32/16k/mono, slices it through the same
//! seg_duration/seg_overlap window the live WS path uses, and waits for
//! the final `RecognitionResult` before responding. `GET /api/healthz` is
//! a plain liveness probe.
//!
//! Decoding prefers an `ffmpeg` child process (any container format ffmpeg
//! understands); when `ffmpeg` isn't on `PATH` it falls back to an
//! in-process WAV-only decoder and any other upload format is rejected,
//! per `original_source/util/server/server_http.py`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use capswriter_protocol::{FrameHeader, RecognitionResult, Source, Task};
use serde_json::json;
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::ServerState;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "status": "running" }))
}

pub async fn transcript(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if !authorized(&headers, &state.secret) {
        return error_response(StatusCode::FORBIDDEN, "forbidden: invalid secret");
    }

    let mut upload: Option<tempfile::NamedTempFile> = None;
    let mut filename = "audio.bin".to_string();
    let mut form_fields: HashMap<String, String> = HashMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &format!("multipart error: {err}")),
        };

        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            filename = field.file_name().unwrap_or("audio.bin").to_string();
            let bytes = match field.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => return error_response(StatusCode::BAD_REQUEST, &format!("failed to read upload: {err}")),
            };
            let file = match tempfile::Builder::new().prefix("capswriter_http_").tempfile() {
                Ok(file) => file,
                Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("tempfile error: {err}")),
            };
            if let Err(err) = std::fs::write(file.path(), &bytes) {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("failed to save upload: {err}"));
            }
            upload = Some(file);
        } else if let Ok(text) = field.text().await {
            form_fields.insert(name, text);
        }
    }

    let Some(upload) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "missing file field or empty file");
    };
    if upload.path().metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        return error_response(StatusCode::BAD_REQUEST, "missing file field or empty file");
    }

    let seg_duration = parse_f32(form_fields.get("seg_duration"), state.http.seg_duration, 1.0);
    let mut seg_overlap = parse_f32(form_fields.get("seg_overlap"), state.http.seg_overlap, 0.0);
    seg_overlap = seg_overlap.min((seg_duration - 0.1).max(0.0));
    let timeout_secs = parse_u64(form_fields.get("timeout_secs"), state.http.timeout_secs, 5);
    let context = form_fields.get("context").cloned();

    tracing::info!(
        file = %filename,
        seg_duration,
        seg_overlap,
        timeout_secs,
        "http transcript request"
    );

    state.metrics.record_http_request();

    match transcribe(&state, upload.path(), seg_duration, seg_overlap, timeout_secs, context).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "task_id": result.task_id,
                "filename": filename,
                "duration": result.duration,
                "time_start": result.time_start,
                "time_submit": result.time_submit,
                "time_complete": result.time_complete,
                "text": result.text,
                "text_accu": result.text_accu,
                "tokens": result.tokens,
                "timestamps": result.timestamps,
                "is_final": result.is_final,
            })),
        )
            .into_response(),
        Err(TranscribeError::Timeout) => {
            state.metrics.record_http_timeout();
            error_response(StatusCode::GATEWAY_TIMEOUT, "transcription timeout")
        }
        Err(TranscribeError::Other(msg)) => {
            state.metrics.record_http_failure();
            tracing::error!(error = %msg, "http transcript failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &msg)
        }
    }
}

enum TranscribeError {
    Timeout,
    Other(String),
}

async fn transcribe(
    state: &Arc<ServerState>,
    file_path: &Path,
    seg_duration: f32,
    seg_overlap: f32,
    timeout_secs: u64,
    context: Option<String>,
) -> Result<RecognitionResult, TranscribeError> {
    let samples = decode_to_mono_16k(file_path).await?;

    let task_id = format!("{:x}", rand::random::<u128>());
    let socket_id = format!("http-{}", uuid::Uuid::new_v4());
    let deadline = Instant::now() + Duration::from_secs(timeout_secs.max(5));
    let time_start = now_secs();

    let (tx, rx) = oneshot::channel();
    state.http_waiters.lock().insert(task_id.clone(), tx);

    let cleanup = |state: &Arc<ServerState>, task_id: &str, socket_id: &str| {
        state.http_waiters.lock().remove(task_id);
        state.queue.close_socket(socket_id);
    };

    let result = transcribe_inner(
        state, &samples, &task_id, &socket_id, seg_duration, seg_overlap, time_start, context, deadline,
    )
    .await;

    match result {
        Ok(()) => {
            let remaining = deadline.saturating_duration_since(Instant::now()).max(Duration::from_millis(1));
            let outcome = match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) => Err(TranscribeError::Other("recognizer channel closed".to_string())),
                Err(_) => Err(TranscribeError::Timeout),
            };
            cleanup(state, &task_id, &socket_id);
            outcome
        }
        Err(err) => {
            cleanup(state, &task_id, &socket_id);
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn transcribe_inner(
    state: &Arc<ServerState>,
    samples: &[f32],
    task_id: &str,
    socket_id: &str,
    seg_duration: f32,
    seg_overlap: f32,
    time_start: f64,
    context: Option<String>,
    deadline: Instant,
) -> Result<(), TranscribeError> {
    const SR: f32 = 16_000.0;
    let threshold_samples = ((seg_duration + 2.0 * seg_overlap) * SR) as usize;
    let segment_samples = ((seg_duration + seg_overlap) * SR) as usize;
    let stride_samples = (seg_duration * SR) as usize;

    let mut cache: &[f32] = samples;
    let mut offset = 0.0_f32;

    while cache.len() >= threshold_samples {
        let segment = cache[..segment_samples.min(cache.len())].to_vec();
        cache = &cache[stride_samples.min(cache.len())..];

        let task = Task {
            header: FrameHeader {
                task_id: task_id.to_string(),
                seg_duration,
                seg_overlap,
                is_final: false,
                time_start: time_start as f64,
                time_submit: now_secs(),
                source: Source::File,
                context: context.clone(),
            },
            payload: segment,
            socket_id: socket_id.to_string(),
        };
        enqueue_with_backpressure(state, task, deadline).await?;
        offset += seg_duration;
    }
    let _ = offset;

    let final_task = Task {
        header: FrameHeader {
            task_id: task_id.to_string(),
            seg_duration,
            seg_overlap,
            is_final: true,
            time_start,
            time_submit: now_secs(),
            source: Source::File,
            context,
        },
        payload: cache.to_vec(),
        socket_id: socket_id.to_string(),
    };
    enqueue_with_backpressure(state, final_task, deadline).await
}

async fn enqueue_with_backpressure(state: &Arc<ServerState>, task: Task, deadline: Instant) -> Result<(), TranscribeError> {
    loop {
        if state.queue.try_enqueue(task.clone()) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(TranscribeError::Timeout);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn decode_to_mono_16k(path: &Path) -> Result<Vec<f32>, TranscribeError> {
    if let Some(ffmpeg) = find_ffmpeg() {
        return decode_via_ffmpeg(&ffmpeg, path).await;
    }

    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if !is_wav {
        return Err(TranscribeError::Other(
            "ffmpeg not found, only WAV upload is supported in fallback mode".to_string(),
        ));
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || decode_wav_fallback(&path))
        .await
        .map_err(|err| TranscribeError::Other(format!("wav decode task panicked: {err}")))?
}

/// Mirrors `_find_ffmpeg`: a binary named `ffmpeg(.exe)` in the current
/// working directory takes priority over whatever `PATH` resolves to.
fn find_ffmpeg() -> Option<PathBuf> {
    let local_name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    if let Ok(cwd) = std::env::current_dir() {
        let local_path = cwd.join(local_name);
        if local_path.is_file() {
            return Some(local_path);
        }
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(local_name))
        .find(|candidate| candidate.is_file())
}

/// `ffmpeg -i <path> -f f32le -ac 1 -ar 16000 -`, stdout parsed as raw
/// little-endian float32 mono samples already at the target rate.
async fn decode_via_ffmpeg(ffmpeg: &Path, path: &Path) -> Result<Vec<f32>, TranscribeError> {
    let output = Command::new(ffmpeg)
        .arg("-nostdin")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(path)
        .arg("-f")
        .arg("f32le")
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg("16000")
        .arg("-")
        .output()
        .await
        .map_err(|err| TranscribeError::Other(format!("failed to spawn ffmpeg: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscribeError::Other(format!(
            "ffmpeg failed: {}",
            stderr.trim()
        )));
    }

    Ok(output
        .stdout
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// `_decode_wav_to_float32_bytes`: 8/16/32-bit PCM or float WAV, downmixed
/// to mono, linearly resampled to 16kHz the same way the original does.
fn decode_wav_fallback(path: &Path) -> Result<Vec<f32>, TranscribeError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|err| TranscribeError::Other(format!("failed to open wav: {err}")))?;
    let spec = reader.spec();
    let channels = (spec.channels as usize).max(1);
    let sample_rate = spec.sample_rate;

    let mut samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| TranscribeError::Other(format!("failed to read wav samples: {err}")))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| TranscribeError::Other(format!("failed to read wav samples: {err}")))?
        }
    };

    if channels > 1 {
        samples = samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
    }

    if sample_rate != 16_000 && samples.len() > 1 {
        samples = linear_resample(&samples, sample_rate, 16_000);
    }

    for sample in samples.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
    Ok(samples)
}

/// `np.interp` over a normalized index space, exactly as the original's
/// WAV fallback resamples: no windowing, just linear interpolation between
/// neighboring source samples.
fn linear_resample(samples: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    let duration = samples.len() as f64 / in_rate as f64;
    let target_len = ((duration * out_rate as f64).round() as usize).max(1);
    let mut out = Vec::with_capacity(target_len);
    for i in 0..target_len {
        let x = i as f64 / target_len as f64 * samples.len() as f64;
        let idx = x.floor() as usize;
        let frac = (x - idx as f64) as f32;
        let a = samples.get(idx).copied().unwrap_or(0.0);
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    headers
        .get("x-capswriter-secret")
        .and_then(|v| v.to_str().ok())
        .map(|provided| provided == expected)
        .unwrap_or(false)
}

fn parse_f32(raw: Option<&String>, default: f32, min: f32) -> f32 {
    raw.and_then(|s| s.trim().parse::<f32>().ok()).map(|v| v.max(min)).unwrap_or(default)
}

fn parse_u64(raw: Option<&String>, default: u64, min: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).map(|v| v.max(min)).unwrap_or(default)
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({ "ok": false, "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seg_overlap_is_clamped_below_seg_duration() {
        let seg_duration = 1.0_f32;
        let mut seg_overlap = parse_f32(Some(&"5.0".to_string()), 1.0, 0.0);
        seg_overlap = seg_overlap.min((seg_duration - 0.1).max(0.0));
        assert!(seg_overlap <= seg_duration - 0.1);
    }

    #[test]
    fn parse_f32_falls_back_to_default_on_garbage_input() {
        assert_eq!(parse_f32(Some(&"not-a-number".to_string()), 6.0, 1.0), 6.0);
    }

    #[test]
    fn parse_u64_enforces_a_floor() {
        assert_eq!(parse_u64(Some(&"2".to_string()), 30, 5), 5);
    }

    #[test]
    fn wav_fallback_downmixes_stereo_and_resamples_to_16k() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for _ in 0..8_000 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(-16_384i16).unwrap();
        }
        writer.finalize().unwrap();

        let samples = decode_wav_fallback(file.path()).unwrap();
        assert_eq!(samples.len(), 16_000);
        assert!(samples.iter().all(|s| s.abs() < 0.01));
    }

    #[test]
    fn linear_resample_doubles_length_for_double_rate() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let resampled = linear_resample(&samples, 4, 8);
        assert_eq!(resampled.len(), 8);
    }
}
