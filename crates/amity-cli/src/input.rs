//! Line commands read from stdin.

use amity_client::{ConversationId, TempId};
use thiserror::Error;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text: send it.
    Send(String),
    /// `/open <conversation>`.
    Open(ConversationId),
    /// `/close`.
    Close,
    /// `/more`: load older history.
    More,
    /// `/reload`: retry a failed initial load.
    Reload,
    /// `/typing`: report a keystroke.
    Typing,
    /// `/attach <path> [caption]`.
    Attach {
        /// File to upload.
        path: String,
        /// Text sent with the media.
        caption: String,
    },
    /// `/resend <temp-id>`.
    Resend(TempId),
    /// `/discard <temp-id>`.
    Discard(TempId),
    /// `/connect`: go online, or retry after giving up.
    Connect,
    /// `/disconnect`: go offline and keep running.
    Disconnect,
    /// `/quit`: log out and exit.
    Quit,
    /// Blank line.
    Nothing,
}

/// Rejected input line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    /// Command name not recognized.
    #[error("unknown command /{0}")]
    Unknown(String),
    /// Command needs an argument.
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
}

impl Input {
    /// Parse one line. Lines starting with `//` send a literal `/`.
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Self::Nothing);
        }
        if let Some(escaped) = line.strip_prefix("//") {
            return Ok(Self::Send(format!("/{escaped}")));
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        let rest = rest.trim();
        let argument = |name: &'static str| {
            if rest.is_empty() { Err(InputError::MissingArgument(name)) } else { Ok(rest) }
        };

        match name {
            "open" => Ok(Self::Open(argument("open")?.into())),
            "close" => Ok(Self::Close),
            "more" => Ok(Self::More),
            "reload" => Ok(Self::Reload),
            "typing" => Ok(Self::Typing),
            "attach" => {
                let (path, caption) = argument("attach")?.split_once(' ').unwrap_or((rest, ""));
                Ok(Self::Attach { path: path.to_string(), caption: caption.trim().to_string() })
            },
            "resend" => Ok(Self::Resend(argument("resend")?.into())),
            "discard" => Ok(Self::Discard(argument("discard")?.into())),
            "connect" => Ok(Self::Connect),
            "disconnect" => Ok(Self::Disconnect),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}

/// Guess a MIME type from a file extension.
pub fn mime_for(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("ogg" | "opus") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_sent() {
        assert_eq!(Input::parse("hello there\n"), Ok(Input::Send("hello there".into())));
        assert_eq!(Input::parse("//slash"), Ok(Input::Send("/slash".into())));
        assert_eq!(Input::parse("   "), Ok(Input::Nothing));
    }

    #[test]
    fn commands_parse() {
        assert_eq!(Input::parse("/open c1"), Ok(Input::Open("c1".into())));
        assert_eq!(Input::parse("/more"), Ok(Input::More));
        assert_eq!(Input::parse("/connect"), Ok(Input::Connect));
        assert_eq!(Input::parse("/disconnect"), Ok(Input::Disconnect));
        assert_eq!(Input::parse("/resend tmp_1_a"), Ok(Input::Resend("tmp_1_a".into())));
        assert_eq!(
            Input::parse("/attach pic.png look at this"),
            Ok(Input::Attach { path: "pic.png".into(), caption: "look at this".into() })
        );
        assert_eq!(
            Input::parse("/attach note.ogg"),
            Ok(Input::Attach { path: "note.ogg".into(), caption: String::new() })
        );
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert_eq!(Input::parse("/open"), Err(InputError::MissingArgument("open")));
        assert_eq!(Input::parse("/dance"), Err(InputError::Unknown("dance".into())));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for("a/b/photo.JPG"), "image/jpeg");
        assert_eq!(mime_for("voice.ogg"), "audio/ogg");
        assert_eq!(mime_for("README"), "application/octet-stream");
    }
}
