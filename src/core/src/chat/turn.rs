use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A typed fragment of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64 image payload with any data-URI prefix already removed.
    Image(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One entry of a session transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    /// A user turn built from parts; a lone text part collapses to plain text.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        let content = match <[ContentPart; 1]>::try_from(parts) {
            Ok([ContentPart::Text(text)]) => TurnContent::Text(text),
            Ok([image]) => TurnContent::Parts(vec![image]),
            Err(parts) => TurnContent::Parts(parts),
        };
        Self {
            role: Role::User,
            content,
        }
    }

    /// Text parts joined by blank lines, in order.
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text(t) => Some(t.as_str()),
                    ContentPart::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    pub fn images(&self) -> Vec<&str> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image(data) => Some(data.as_str()),
                    ContentPart::Text(_) => None,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_text_part_collapses() {
        let turn = Turn::user_parts(vec![ContentPart::Text("hi".into())]);
        assert_eq!(turn, Turn::user_text("hi"));
    }

    #[test]
    fn mixed_parts_stay_parts() {
        let turn = Turn::user_parts(vec![
            ContentPart::Text("look".into()),
            ContentPart::Image("AAAA".into()),
            ContentPart::Text("Content of a.txt:\nbody".into()),
        ]);
        assert!(matches!(turn.content, TurnContent::Parts(ref p) if p.len() == 3));
        assert_eq!(turn.text(), "look\n\nContent of a.txt:\nbody");
        assert_eq!(turn.images(), vec!["AAAA"]);
    }
}
