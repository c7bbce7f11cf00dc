/// MIME type for a URL, chosen by file extension.
///
/// Unknown or missing extensions fall back to `text/html`, which keeps
/// extension-less dynamic pages rendering as documents.
#[must_use]
pub fn mime_for_url(url: &str) -> &'static str {
    let extension = url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .unwrap_or("");

    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "css" => "text/css",
        "txt" => "text/plain",
        "svg" | "svgz" => "image/svg+xml",
        "cache" => "text/cache-manifest",
        "otf" => "font/otf",
        "eot" => "font/eot",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "au" => "audio/basic",
        "wav" => "audio/wav",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "mp3" => "audio/mpeg",
        "csv" => "text/csv",
        "mp4" => "application/mp4",
        "bin" => "application/octet-stream",
        "doc" | "docx" => "application/msword",
        "pdf" => "application/pdf",
        "ps" | "eps" | "ai" => "application/postscript",
        "tar" => "application/x-tar",
        "h264" => "video/h264",
        "dv" => "video/dv",
        "qt" | "mov" => "video/quicktime",
        _ => "text/html",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(mime_for_url("index.html"), "text/html");
        assert_eq!(mime_for_url("assets/app.js"), "application/javascript");
        assert_eq!(mime_for_url("a/b/c/logo.svgz"), "image/svg+xml");
        assert_eq!(mime_for_url("movie.mp4"), "application/mp4");
        assert_eq!(mime_for_url("fonts/main.woff2"), "font/woff2");
    }

    #[test]
    fn test_fallback_is_html() {
        assert_eq!(mime_for_url("no-extension"), "text/html");
        assert_eq!(mime_for_url("weird.zzz"), "text/html");
        assert_eq!(mime_for_url(""), "text/html");
    }

    #[test]
    fn test_dotted_directories_do_not_confuse() {
        assert_eq!(mime_for_url("v1.2/data"), "text/html");
        assert_eq!(mime_for_url("v1.2/data.json"), "application/json");
    }
}
