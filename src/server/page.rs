//! HTML for the upload form and the result page.
//!
//! Audio is embedded as WAV data URIs so nothing produced by a request
//! outlives the response.

use base64::Engine;

use crate::audio::{encode_wav, AudioError};
use crate::pipeline::ProcessedAudio;

const TITLE: &str = "Speech Enhancement - MetricGAN+";

/// File name offered for the enhanced download
pub const DOWNLOAD_FILENAME: &str = "enhanced.wav";

/// MIME type for the enhanced download
pub const WAV_MIME: &str = "audio/wav";

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem}\
.warning{background:#fff4e5;border:1px solid #f0a020;padding:.75rem;border-radius:4px}\
figure{margin:1rem 0}audio{width:100%}";

/// Escape text for inclusion in HTML content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `data:` URI of the samples encoded as WAV
pub fn wav_data_uri(samples: &[f32], sample_rate: u32) -> Result<String, AudioError> {
    let wav = encode_wav(samples, sample_rate)?;
    Ok(format!(
        "data:{};base64,{}",
        WAV_MIME,
        base64::engine::general_purpose::STANDARD.encode(wav)
    ))
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<title>{title}</title>\n<style>{style}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = TITLE,
        style = STYLE,
        body = body
    )
}

fn form() -> &'static str {
    "<form action=\"/enhance\" method=\"post\" enctype=\"multipart/form-data\">\n\
<label for=\"file\">Upload an audio file</label>\n\
<input type=\"file\" id=\"file\" name=\"file\" accept=\".wav\" required>\n\
<button type=\"submit\">Enhance</button>\n\
</form>"
}

/// Upload form, optionally with a warning from a rejected upload
pub fn upload_form(warning: Option<&str>) -> String {
    let warning = warning
        .map(|w| format!("<p class=\"warning\" role=\"alert\">{}</p>\n", escape_html(w)))
        .unwrap_or_default();
    layout(&format!("{}{}", warning, form()))
}

fn audio_widget(caption: &str, src: &str) -> String {
    format!(
        "<figure>\n<figcaption>{}</figcaption>\n<audio controls src=\"{}\"></audio>\n</figure>\n",
        caption, src
    )
}

/// Result page: both signals as players plus the enhanced download
pub fn result_page(processed: &ProcessedAudio) -> Result<String, AudioError> {
    let noisy_uri = wav_data_uri(&processed.original, processed.sample_rate)?;
    let enhanced_uri = wav_data_uri(&processed.enhanced, processed.sample_rate)?;

    let body = format!(
        "{noisy}{enhanced}<p><a href=\"{uri}\" download=\"{file}\" type=\"{mime}\">Download enhanced signal</a></p>\n\
<p class=\"meta\">{rate} Hz, {seconds:.2} s</p>\n{form}",
        noisy = audio_widget("Noisy signal", &noisy_uri),
        enhanced = audio_widget("Enhanced signal", &enhanced_uri),
        uri = enhanced_uri,
        file = DOWNLOAD_FILENAME,
        mime = WAV_MIME,
        rate = processed.sample_rate,
        seconds = processed.enhanced.len() as f32 / processed.sample_rate as f32,
        form = form()
    );

    Ok(layout(&body))
}
