use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use snafu::{ensure, ResultExt, Snafu};
use url::Url;

const DRIVE_HOST: &str = "drive.google.com";

/// Rewrites sharing links into direct-download links. Other URLs are returned unchanged.
///
/// `https://drive.google.com/file/d/<id>/view?usp=sharing` and
/// `https://drive.google.com/open?id=<id>` both become
/// `https://drive.google.com/uc?export=download&id=<id>`.
pub fn resolve_download_url(link: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(link).context(InvalidUrlSnafu { url: link })?;
    if url.host_str() != Some(DRIVE_HOST) {
        return Ok(url);
    }

    let from_path = url.path_segments().and_then(|mut segments| {
        let (file, d, id) = (segments.next()?, segments.next()?, segments.next()?);
        (file == "file" && d == "d" && !id.is_empty()).then(|| id.to_owned())
    });
    let from_query = || url.query_pairs().find(|(key, _)| key == "id").map(|(_, id)| id.into_owned());

    match from_path.or_else(from_query) {
        Some(id) => Url::parse_with_params(&format!("https://{DRIVE_HOST}/uc"), &[("export", "download"), ("id", id.as_str())])
            .context(InvalidUrlSnafu { url: link }),
        None => Ok(url),
    }
}

/// Fetches `link` into `target`. Anything that is not an image is rejected.
pub fn download_image(link: &str, target: &Path) -> Result<(), DownloadError> {
    let url = resolve_download_url(link)?;
    info!("Downloading test image from {url}");

    let response = reqwest::blocking::get(url.clone())
        .and_then(|response| response.error_for_status())
        .context(RequestSnafu { url: url.to_string() })?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    ensure!(content_type.starts_with("image/"), NotAnImageSnafu { url: url.to_string(), content_type });

    let bytes = response.bytes().context(RequestSnafu { url: url.to_string() })?;
    write_complete(target, &bytes)?;

    info!("Saved {} bytes to {}", bytes.len(), target.display());
    Ok(())
}

/// Writes next to `target` first and renames, so `target` never exists half written.
pub fn write_complete(target: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).context(WriteSnafu { path: parent })?;
    }

    let partial = partial_path(target);
    fs::write(&partial, bytes).context(WriteSnafu { path: &partial })?;
    if let Err(source) = fs::rename(&partial, target) {
        let _ = fs::remove_file(&partial);
        return Err(source).context(WriteSnafu { path: target });
    }
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.part", std::process::id()));
    target.with_file_name(name)
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum DownloadError {
    #[snafu(display("Invalid download URL {url}"))]
    InvalidUrl { url: String, source: url::ParseError },

    #[snafu(display("Could not download {url}"))]
    Request { url: String, source: reqwest::Error },

    #[snafu(display("{url} returned {content_type:?} instead of an image"))]
    NotAnImage { url: String, content_type: String },

    #[snafu(display("Could not write {}", path.display()))]
    Write { path: PathBuf, source: std::io::Error },
}
