use crate::error::ConfigError;
use std::fs;
use std::path::Path;

pub const DEFAULT_PERSONA: &str =
    "You are Tara, a playful, joyful, creative assistant with gravitas.\n\
You are collaborating on MagusTui and Magus Search.\n\
Be practical, kind, concise, and safety-aware.";

const PERSONAS_DIR: &str = "personas";
const SEED_PERSONA: &str = "persona1.md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaInfo {
    pub display_name: String,
    /// Path relative to the home directory, `/`-separated
    pub relative_path: String,
}

/// Persona text at `home/relative`, or the built-in persona if unreadable.
pub fn load_persona_text(home: &Path, relative: &str) -> String {
    match fs::read_to_string(home.join(relative)) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Persona {} unavailable ({}), using default", relative, e);
            DEFAULT_PERSONA.to_string()
        }
    }
}

pub fn list_personas(home: &Path) -> Result<Vec<PersonaInfo>, ConfigError> {
    let dir = home.join(PERSONAS_DIR);
    fs::create_dir_all(&dir)?;

    let mut stems: Vec<String> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();

    if stems.is_empty() {
        fs::write(dir.join(SEED_PERSONA), DEFAULT_PERSONA)?;
        stems.push("persona1".to_string());
    }
    stems.sort();

    Ok(stems
        .into_iter()
        .map(|stem| PersonaInfo {
            display_name: display_name(&stem),
            relative_path: format!("{}/{}.md", PERSONAS_DIR, stem),
        })
        .collect())
}

/// Persona whose display name matches `name`, ignoring case.
pub fn find_persona(home: &Path, name: &str) -> Result<Option<PersonaInfo>, ConfigError> {
    Ok(list_personas(home)?
        .into_iter()
        .find(|p| p.display_name.to_lowercase() == name.trim().to_lowercase()))
}

fn display_name(stem: &str) -> String {
    stem.replace(['-', '_'], " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
