//! Outbound tool-call catalog
//!
//! The remote service is configured with this fixed set of named tools at
//! session open; the transport passes it through unchanged. Declarations use
//! the service's function-declaration schema.

use serde_json::{json, Value};

/// The complete tool catalog supplied at session open
///
/// Six function declarations plus the search grounding tool.
#[must_use]
pub fn catalog() -> Vec<Value> {
    vec![json!({
        "functionDeclarations": [
            manage_tasks(),
            manage_reminders(),
            manage_notes(),
            log_mood(),
            update_display(),
            music_control(),
        ],
        "googleSearch": {}
    })]
}

fn manage_tasks() -> Value {
    json!({
        "name": "manageTasks",
        "description": "Create, update, or remove a task in the user's todo list.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["create", "complete", "delete"],
                    "description": "The action to perform on the task."
                },
                "taskTitle": {
                    "type": "STRING",
                    "description": "The content/title of the task. Required for creation."
                },
                "taskSearchTerm": {
                    "type": "STRING",
                    "description": "A search term to find a task to complete or delete."
                }
            },
            "required": ["action"]
        }
    })
}

fn manage_reminders() -> Value {
    json!({
        "name": "manageReminders",
        "description": "Create, complete, or delete reminders.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["create", "complete", "delete"],
                    "description": "Action to perform."
                },
                "title": {
                    "type": "STRING",
                    "description": "The reminder content."
                },
                "searchTerm": {
                    "type": "STRING",
                    "description": "Search term to find reminder."
                }
            },
            "required": ["action"]
        }
    })
}

fn manage_notes() -> Value {
    json!({
        "name": "manageNotes",
        "description": "Create or delete personal notes.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["create", "delete"],
                    "description": "Action to perform."
                },
                "content": {
                    "type": "STRING",
                    "description": "The content of the note."
                }
            },
            "required": ["action"]
        }
    })
}

fn log_mood() -> Value {
    json!({
        "name": "logMood",
        "description": "Log the user's current mood and energy level.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "score": {
                    "type": "NUMBER",
                    "description": "Mood score from 1 (terrible) to 5 (amazing)."
                },
                "notes": {
                    "type": "STRING",
                    "description": "Brief description of why they feel this way."
                }
            },
            "required": ["score"]
        }
    })
}

fn update_display() -> Value {
    json!({
        "name": "updateDisplay",
        "description": "Update the visual display on the user's dashboard with an image, video, music player, or text.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "type": {
                    "type": "STRING",
                    "enum": ["image", "video", "text", "music"],
                    "description": "Type of media to display."
                },
                "url": {
                    "type": "STRING",
                    "description": "URL for the media."
                },
                "content": {
                    "type": "STRING",
                    "description": "Text content if type is text."
                },
                "title": {
                    "type": "STRING",
                    "description": "Short title for the display."
                }
            },
            "required": ["type"]
        }
    })
}

fn music_control() -> Value {
    json!({
        "name": "musicControl",
        "description": "Control music playback, search for music, or get the user's top tracks.",
        "parameters": {
            "type": "OBJECT",
            "properties": {
                "action": {
                    "type": "STRING",
                    "enum": ["play", "pause", "next", "previous", "search", "get_top_tracks"],
                    "description": "The action to perform."
                },
                "query": {
                    "type": "STRING",
                    "description": "Search query for the song, artist, or playlist (only for \"search\")."
                },
                "type": {
                    "type": "STRING",
                    "enum": ["track", "album", "playlist"],
                    "description": "Type of content to search for (default: track)."
                }
            },
            "required": ["action"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_declares_all_six_tools() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 1);

        let declarations = catalog[0]["functionDeclarations"].as_array().unwrap();
        let names: Vec<_> = declarations
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "manageTasks",
                "manageReminders",
                "manageNotes",
                "logMood",
                "updateDisplay",
                "musicControl"
            ]
        );
        assert!(catalog[0].get("googleSearch").is_some());
    }

    #[test]
    fn every_declaration_requires_its_primary_field() {
        for declaration in catalog()[0]["functionDeclarations"].as_array().unwrap() {
            let required = declaration["parameters"]["required"].as_array().unwrap();
            assert!(!required.is_empty(), "{} has no required fields", declaration["name"]);
        }
    }
}
