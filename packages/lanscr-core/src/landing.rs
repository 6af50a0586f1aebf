//! Embedded landing page.
//!
//! Kept deliberately small: a live view image, the audio element, and a mute
//! toggle backed by `/control`. Most browsers block audio autoplay until a
//! user gesture, hence the explicit play button.

/// The HTML body served at `/` and `/index.html`.
pub const LANDING_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>LANSCR</title>
<style>
  body { margin: 0; background: #101114; color: #d7d9de; font-family: system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 12px; padding: 8px 14px; }
  header h1 { font-size: 16px; margin: 0; letter-spacing: 1px; }
  header span { font-size: 13px; color: #8a8f99; }
  button { background: #23262d; color: inherit; border: 1px solid #3a3f49; border-radius: 4px; padding: 4px 12px; cursor: pointer; }
  img { display: block; width: 100%; height: auto; }
</style>
</head>
<body>
<header>
  <h1>LANSCR</h1>
  <button id="play">Play audio</button>
  <button id="mute">Toggle server mute</button>
  <span id="status">...</span>
</header>
<img src="/mjpeg" alt="live screen">
<audio id="audio" src="/audio"></audio>
<script>
  const status = document.getElementById('status');
  async function poll() {
    try {
      const r = await fetch('/control', { cache: 'no-store' });
      const j = await r.json();
      status.textContent = (j.audioMuted ? 'Server audio muted' : 'Server audio on')
        + (j.privateMode ? ' | private' : '');
    } catch (e) { status.textContent = 'control unreachable'; }
  }
  document.getElementById('play').onclick = () => document.getElementById('audio').play();
  document.getElementById('mute').onclick = async () => {
    try {
      const r = await fetch('/control', { cache: 'no-store' });
      const j = await r.json();
      await fetch('/control?mute=' + (j.audioMuted ? 0 : 1), { cache: 'no-store' });
      poll();
    } catch (e) {}
  };
  poll();
  setInterval(poll, 3000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_identifies_the_app_and_streams() {
        assert!(LANDING_HTML.contains("LANSCR"));
        assert!(LANDING_HTML.contains("/mjpeg"));
        assert!(LANDING_HTML.contains("/audio"));
        assert!(LANDING_HTML.contains("/control"));
    }
}
