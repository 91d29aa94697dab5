use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters escaped in a URL path segment. `+` and `~` are common in Debian
/// versions and are left alone.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Joins a repository-relative path onto a base URL, escaping each segment.
///
/// Bare filesystem paths are joined verbatim since they are never URL-decoded.
pub fn join_url(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if base.starts_with('/') {
        return format!("{}/{}", base.trim_end_matches('/'), relative);
    }

    let encoded = relative
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", base.trim_end_matches('/'), encoded)
}

/// Extract filename from URL path
pub fn filename_from_url(url: &str) -> Option<String> {
    let last = match Url::parse(url) {
        Ok(parsed) => {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back())
                .map(String::from)
        }
        Err(_) => url.rsplit('/').next().map(String::from),
    }?;

    if last.is_empty() {
        return None;
    }

    percent_decode_str(&last)
        .decode_utf8()
        .ok()
        .map(|cow| cow.into_owned())
}

/// Returns the scheme of `url`, treating a bare absolute path as `file`.
pub fn url_scheme(url: &str) -> Option<String> {
    if url.starts_with('/') {
        return Some("file".to_string());
    }
    Url::parse(url).ok().map(|u| u.scheme().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://deb.example.org/debian/", "pool/main/h/hello/hello_2.10-3_amd64.deb"),
            "http://deb.example.org/debian/pool/main/h/hello/hello_2.10-3_amd64.deb"
        );
    }

    #[test]
    fn test_join_url_escapes_but_keeps_debian_characters() {
        assert_eq!(
            join_url("http://x", "/pool/my pkg/a_1.0~rc1+b1_all.deb"),
            "http://x/pool/my%20pkg/a_1.0~rc1+b1_all.deb"
        );
    }

    #[test]
    fn test_join_url_bare_path_is_verbatim() {
        assert_eq!(
            join_url("/srv/mirror/", "pool/my pkg/a_100%_all.deb"),
            "/srv/mirror/pool/my pkg/a_100%_all.deb"
        );
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("http://x/pool/a%20b_1.0_all.deb").as_deref(),
            Some("a b_1.0_all.deb")
        );
        assert_eq!(
            filename_from_url("/srv/mirror/Packages.gz").as_deref(),
            Some("Packages.gz")
        );
        assert_eq!(filename_from_url("http://x/dir/"), None);
    }

    #[test]
    fn test_url_scheme() {
        assert_eq!(url_scheme("https://x/y").as_deref(), Some("https"));
        assert_eq!(url_scheme("file:///srv").as_deref(), Some("file"));
        assert_eq!(url_scheme("/srv/mirror").as_deref(), Some("file"));
        assert_eq!(url_scheme("relative/path"), None);
    }
}
