//! The `openApp` tool: a fixed table of apps the assistant may open

use serde_json::{Value, json};

/// Name of the app-opening function exposed to the model
pub const OPEN_APP: &str = "openApp";

/// Apps the assistant may open, with the URL each one launches
///
/// Adding an app is a change to this table only; the declaration sent to the
/// backend is generated from it.
pub const APPS: &[(&str, &str)] = &[
    ("WhatsApp", "https://web.whatsapp.com/"),
    ("Instagram", "https://www.instagram.com/"),
    ("Facebook", "https://www.facebook.com/"),
    ("YouTube", "https://www.youtube.com/"),
    ("Twitter", "https://twitter.com/"),
    ("Google", "https://www.google.com/"),
    ("Spotify", "https://open.spotify.com/"),
    ("Netflix", "https://www.netflix.com/"),
    ("Gmail", "https://mail.google.com/"),
    ("Maps", "https://maps.google.com/"),
];

/// Look up the URL for an app name (exact match)
#[must_use]
pub fn app_url(name: &str) -> Option<&'static str> {
    APPS.iter()
        .find(|(app, _)| *app == name)
        .map(|(_, url)| *url)
}

/// Function declaration for `openApp`, as sent in the session setup
#[must_use]
pub fn open_app_declaration() -> Value {
    let names: Vec<&str> = APPS.iter().map(|(app, _)| *app).collect();

    json!({
        "name": OPEN_APP,
        "description": "Opens a specified application or website when the user asks.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "appName": {
                    "type": "STRING",
                    "description": format!(
                        "The name of the application or website to open. Supported: {}.",
                        names.join(", ")
                    ),
                    "enum": names,
                }
            },
            "required": ["appName"],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_lookup() {
        assert_eq!(app_url("Spotify"), Some("https://open.spotify.com/"));
        assert_eq!(app_url("Maps"), Some("https://maps.google.com/"));
        assert_eq!(app_url("spotify"), None);
        assert_eq!(app_url("Unknown"), None);
    }

    #[test]
    fn test_declaration_lists_every_app() {
        let decl = open_app_declaration();
        assert_eq!(decl["name"], OPEN_APP);

        let values = decl["parameters"]["properties"]["appName"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(values.len(), 10);
        assert_eq!(values[0], "WhatsApp");
        assert_eq!(values[9], "Maps");
        assert_eq!(decl["parameters"]["required"][0], "appName");
    }
}
