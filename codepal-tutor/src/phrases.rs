//! Canned, in-character lines the tutor says without asking the model.

use codepal_core::Error;
use std::fmt;
use std::str::FromStr;

/// Language the tutor speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }

    /// Language name as written into model prompts
    pub fn language(&self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Es => "Spanish",
        }
    }

    pub fn greeting(&self, level_title: &str, instruction: &str) -> String {
        match self {
            Locale::En => format!(
                "Hi, I'm Pixel! Welcome to \"{}\". Here is your first mission: {}",
                level_title, instruction
            ),
            Locale::Es => format!(
                "¡Hola, soy Pixel! Bienvenido a \"{}\". Tu primera misión: {}",
                level_title, instruction
            ),
        }
    }

    pub fn apology(&self) -> &'static str {
        match self {
            Locale::En => "Oops, my circuits got tangled! Can you say that again?",
            Locale::Es => "¡Ups, se me enredaron los circuitos! ¿Puedes decirlo otra vez?",
        }
    }

    pub fn runtime_error(&self) -> &'static str {
        match self {
            Locale::En => "Runtime error: the robot could not run this program.",
            Locale::Es => "Error de ejecución: el robot no pudo ejecutar este programa.",
        }
    }

    pub fn next_step(&self, instruction: &str) -> String {
        match self {
            Locale::En => format!("Awesome work! Next mission: {}", instruction),
            Locale::Es => format!("¡Buen trabajo! Siguiente misión: {}", instruction),
        }
    }

    pub fn level_complete(&self, level_title: &str) -> String {
        match self {
            Locale::En => format!(
                "You finished \"{}\"! You're a real coder now. Head back to the menu for the next level.",
                level_title
            ),
            Locale::Es => format!(
                "¡Terminaste \"{}\"! Ya eres todo un programador. Vuelve al menú para el siguiente nivel.",
                level_title
            ),
        }
    }

    pub fn explain_fallback(&self) -> &'static str {
        match self {
            Locale::En => "Hmm, that didn't quite work. Look at the console and let's try again together!",
            Locale::Es => "Mmm, eso no funcionó del todo. Mira la consola y ¡intentémoslo otra vez juntos!",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = Error;

    /// Accepts `en`, `es` and region-tagged forms such as `es-MX`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            _ => Err(Error::config_invalid(
                "CODEPAL_LOCALE",
                format!("unsupported locale '{}'", s.trim()),
            )),
        }
    }
}
