/// Build the publish target from a server URL and a stream name.
///
/// Exactly one `/` separates the two: it is appended to `base` only when
/// `base` does not already end with one. Nothing else is normalised.
pub fn compose_publish_url(base: &str, stream_name: &str) -> String {
    let mut url = String::with_capacity(base.len() + stream_name.len() + 1);
    url.push_str(base);
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(stream_name);
    url
}
