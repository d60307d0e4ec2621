//! Pages of the provisioning portal
//!
//! The portal is opened from phones joining the device's access point, so
//! the pages are self-contained: no scripts, no external resources.

use crate::network_probe::ScanResult;
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;max-width:28em;margin:2em auto;padding:0 1em}\
label,select,input,button{display:block;width:100%;margin:.4em 0;font-size:1.1em}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

/// Form listing `networks` in the order given
pub fn setup_page(networks: &ScanResult) -> String {
    let mut options = String::new();
    for ssid in networks.iter() {
        let ssid = escape(ssid);
        let _ = writeln!(options, "<option value=\"{ssid}\">{ssid}</option>");
    }

    let network_input = if networks.is_empty() {
        "<p>No networks found. Enter the network name manually.</p>\n\
         <input type=\"text\" id=\"ssid\" name=\"ssid\" maxlength=\"32\" required>\n"
            .to_string()
    } else {
        format!("<select id=\"ssid\" name=\"ssid\">\n{options}</select>\n")
    };

    let body = format!(
        "<h1>Wi-Fi Setup</h1>\n\
         <form method=\"post\" action=\"/connect\">\n\
         <label for=\"ssid\">Network</label>\n{network_input}\
         <label for=\"password\">Password</label>\n\
         <input type=\"password\" id=\"password\" name=\"password\" placeholder=\"leave empty for open networks\">\n\
         <button type=\"submit\">Connect</button>\n\
         </form>\n"
    );

    page("Wi-Fi Setup", &body)
}

/// Answer to an accepted submission; the access point goes down right after
pub fn connecting_page(ssid: &str) -> String {
    let body = format!(
        "<h1>Connecting</h1>\n\
         <p>The device is now joining <b>{}</b>. This access point will shut down.</p>\n\
         <p>If the device does not come online, reconnect to its access point and try again.</p>\n",
        escape(ssid)
    );

    page("Connecting", &body)
}

/// Escape text for use in element content and quoted attributes
pub fn escape(text: &str) -> String {
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
