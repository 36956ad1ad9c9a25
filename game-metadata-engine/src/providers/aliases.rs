//! Known title aliases for the official store search.
//!
//! Some library titles never match the store's spelling (trademark symbols,
//! edition suffixes, subtitle punctuation). Aliases are checked exact-case
//! first, then case-insensitively; anything else is searched unchanged.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAlias {
    pub pattern: String,
    pub replacement: String,
}

impl TitleAlias {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Ordered alias list. The first matching entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAliases {
    entries: Vec<TitleAlias>,
}

const BUILTIN: &[(&str, &str)] = &[
    ("Tom Clancy's Rainbow Six Siege", "Tom Clancy's Rainbow Six® Siege"),
    ("Rainbow Six Siege", "Tom Clancy's Rainbow Six® Siege"),
    ("The Witcher 3", "The Witcher 3: Wild Hunt"),
    ("The Witcher 3 GOTY", "The Witcher 3: Wild Hunt"),
    ("Skyrim", "The Elder Scrolls V: Skyrim Special Edition"),
    ("Skyrim Special Edition", "The Elder Scrolls V: Skyrim Special Edition"),
    ("Fallout 4 GOTY", "Fallout 4"),
    ("GTA V", "Grand Theft Auto V"),
    ("GTA 5", "Grand Theft Auto V"),
    ("CS2", "Counter-Strike 2"),
    ("CS:GO", "Counter-Strike 2"),
    ("Doom Eternal", "DOOM Eternal"),
    ("Assassins Creed II", "Assassin's Creed 2"),
    ("Sid Meier's Civilization VI", "Sid Meier’s Civilization® VI"),
    ("Civilization VI", "Sid Meier’s Civilization® VI"),
    ("Dark Souls Remastered", "DARK SOULS™: REMASTERED"),
    ("Dark Souls III", "DARK SOULS™ III"),
    ("Elden Ring", "ELDEN RING"),
    ("Sekiro", "Sekiro™: Shadows Die Twice - GOTY Edition"),
    ("Nier Automata", "NieR:Automata™"),
];

impl TitleAliases {
    pub fn new(entries: Vec<TitleAlias>) -> Self {
        Self { entries }
    }

    /// Aliases shipped with the engine.
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(pattern, replacement)| TitleAlias::new(*pattern, *replacement))
                .collect(),
        )
    }

    /// Append an alias; it is tried after every existing entry.
    pub fn push(&mut self, alias: TitleAlias) {
        self.entries.push(alias);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store spelling for `title`, or `title` itself when no alias applies.
    pub fn resolve<'a>(&'a self, title: &'a str) -> &'a str {
        let trimmed = title.trim();

        if let Some(alias) = self.entries.iter().find(|a| a.pattern == trimmed) {
            return &alias.replacement;
        }

        let lowered = trimmed.to_lowercase();
        if let Some(alias) = self
            .entries
            .iter()
            .find(|a| a.pattern.to_lowercase() == lowered)
        {
            return &alias.replacement;
        }

        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_case_alias() {
        let aliases = TitleAliases::builtin();
        assert_eq!(aliases.resolve("GTA V"), "Grand Theft Auto V");
    }

    #[test]
    fn test_case_insensitive_alias() {
        let aliases = TitleAliases::builtin();
        assert_eq!(aliases.resolve("  gta v "), "Grand Theft Auto V");
        assert_eq!(aliases.resolve("ELDEN ring"), "ELDEN RING");
    }

    #[test]
    fn test_exact_case_checked_before_folded() {
        let aliases = TitleAliases::new(vec![
            TitleAlias::new("doom", "lowercase hit"),
            TitleAlias::new("DOOM", "exact hit"),
        ]);
        assert_eq!(aliases.resolve("DOOM"), "exact hit");
        assert_eq!(aliases.resolve("Doom"), "lowercase hit");
    }

    #[test]
    fn test_unknown_title_passes_through() {
        let aliases = TitleAliases::builtin();
        assert_eq!(aliases.resolve("Half-Life 2"), "Half-Life 2");
    }

    #[test]
    fn test_push_extends_table() {
        let mut aliases = TitleAliases::default();
        assert!(aliases.is_empty());
        aliases.push(TitleAlias::new("HL2", "Half-Life 2"));
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases.resolve("hl2"), "Half-Life 2");
    }
}
