//! Single lookups: `fetch`, `thumb` and `sha1`.

use mediarepo::repo::{normalize_title, ImageInfo, QueryParams};
use mediarepo::MetadataRepo;

use crate::error::CliError;

/// Print the metadata of one file.
pub fn run_fetch(
    repo: &mut MetadataRepo,
    name: &str,
    params: &QueryParams,
    json: bool,
) -> Result<(), CliError> {
    let envelope = repo
        .fetch(name, params)
        .ok_or_else(|| CliError::NotFound(name.to_string()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    let title = normalize_title(name);
    let resolved = envelope.resolve_title(&title);
    match envelope.page(&title) {
        Some(page) if page.is_missing() => Err(CliError::NotFound(resolved)),
        Some(page) => {
            println!("{}", page.title);
            if let Some(repo_name) = &page.imagerepository {
                println!("  Repository: {}", repo_name);
            }
            match page.imageinfo.first() {
                Some(info) => print_image_info(info),
                None => println!("  (no image info)"),
            }
            Ok(())
        }
        None => Err(CliError::NotFound(resolved)),
    }
}

fn print_image_info(info: &ImageInfo) {
    let fields = [
        ("URL", info.url.clone()),
        ("Modified", info.timestamp.clone()),
        ("MIME", info.mime.clone()),
        ("Media type", info.mediatype.clone()),
        ("SHA-1", info.sha1.clone()),
        ("Size", info.size.map(|s| format!("{} bytes", s))),
        (
            "Dimensions",
            info.width
                .zip(info.height)
                .map(|(w, h)| format!("{}x{}", w, h)),
        ),
        ("Description", info.descriptionurl.clone()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<12} {}", format!("{}:", label), value);
        }
    }
}

/// Print the thumbnail URL of one file at the given size.
pub fn run_thumb(
    repo: &mut MetadataRepo,
    name: &str,
    width: u32,
    height: Option<u32>,
    param: Option<&str>,
) -> Result<(), CliError> {
    let thumb = repo
        .thumb_url(name, width, height, param)
        .ok_or_else(|| CliError::NotFound(format!("{} at {}px", name, width)))?;
    match thumb.width.zip(thumb.height) {
        Some((w, h)) => println!("{} ({}x{})", thumb.url, w, h),
        None => println!("{}", thumb.url),
    }
    Ok(())
}

/// Print every file whose content hashes to `hash`.
pub fn run_sha1(repo: &mut MetadataRepo, hash: &str) -> Result<(), CliError> {
    let titles = repo.find_by_sha1(hash);
    if titles.is_empty() {
        return Err(CliError::NotFound(format!("files with SHA-1 {}", hash)));
    }
    for title in titles {
        println!("{}", title);
    }
    Ok(())
}
