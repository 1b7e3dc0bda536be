// src/names.rs

//! Memorable `adjective_surname` aliases for runs, in the style of container
//! names.

use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "admiring", "amazing", "awesome", "blissful", "bold", "brave", "busy", "charming",
    "clever", "cool", "compassionate", "confident", "dazzling", "determined", "eager",
    "ecstatic", "elastic", "elegant", "epic", "festive", "focused", "friendly", "gallant",
    "gifted", "gracious", "happy", "hopeful", "inspiring", "jolly", "keen", "kind",
    "laughing", "loving", "lucid", "magical", "modest", "nifty", "nostalgic", "objective",
    "optimistic", "peaceful", "pensive", "practical", "quirky", "relaxed", "serene",
    "sharp", "stoic", "sweet", "tender", "trusting", "upbeat", "vibrant", "vigilant",
    "wizardly", "wonderful", "youthful", "zealous", "zen",
];

const SURNAMES: &[&str] = &[
    "avery", "blackburn", "brenner", "chargaff", "crick", "darwin", "delbruck",
    "doudna", "franklin", "gilbert", "greider", "hershey", "hodgkin", "hooke",
    "jacob", "khorana", "kornberg", "lederberg", "leeuwenhoek", "margulis", "mcclintock",
    "mendel", "meselson", "monod", "mullis", "nirenberg", "nurse", "ochoa", "pasteur",
    "pauling", "sanger", "stahl", "sturtevant", "sulston", "temin", "tonegawa",
    "venter", "watson", "wilkins", "woese", "yalow",
];

/// Generate a random alias such as `serene_franklin`.
pub fn random_alias() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("anonymous");
    let surname = SURNAMES.choose(&mut rng).copied().unwrap_or("run");
    format!("{adjective}_{surname}")
}
