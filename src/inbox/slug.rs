//! Rules for the slugs people pick when creating a mailbox, and friendly
//! generated ones for when they do not pick one.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::{MailslotError, Result};

/// Shortest slug a person may choose.
pub const MIN_SLUG_LEN: usize = 3;

/// Longest slug a person may choose.
pub const MAX_SLUG_LEN: usize = 30;

/// Words a chosen slug may not contain, once `.` and `_` are removed.
const RESERVED_WORDS: &[&str] = &[
    // system
    "admin", "administrator", "root", "system", "mail", "email", "suporte", "support",
    "help", "ajuda", "info", "contact", "contato", "webmaster", "postmaster", "hostmaster",
    "abuse", "noreply", "security", "seguranca", "billing", "sales", "marketing", "legal",
    "compliance", "privacy", "newsletter", "notification", "alert", "daemon", "mailer",
    "ftp", "www",
    // placeholders
    "qualquercoisa", "qualquer", "nada", "tudo", "algo", "teste", "test", "testing", "temp",
    "temporario", "temporary", "tmp", "anonimo", "anonymous", "fake", "falso", "null",
    "undefined", "void", "exemplo", "example", "sample", "demo", "default", "user",
    "usuario", "nome", "name", "seunome", "yourname", "meunome", "myname", "asdf", "qwerty",
    "aaa", "bbb", "ccc", "abc", "xyz", "123", "1234",
    // brands
    "google", "facebook", "instagram", "twitter", "meta", "apple", "microsoft", "amazon",
    "netflix", "spotify", "whatsapp", "telegram", "discord", "tiktok", "youtube",
    "linkedin", "snapchat", "pinterest", "reddit", "twitch", "paypal", "mercadopago",
    "nubank", "itau", "bradesco", "santander",
    // our own domains
    "porranenhuma", "xablau", "biscoito", "bolacha", "aquelaursa", "tuamaeaquelaursa",
];

const ADJECTIVES: &[&str] = &[
    "azul", "verde", "vermelho", "amarelo", "roxo", "laranja", "rosa", "dourado", "prateado",
    "solar", "lunar", "estelar", "tropical", "polar", "feliz", "alegre", "sereno", "calmo",
    "tranquilo", "gentil", "doce", "rapido", "veloz", "agil", "forte", "bravo", "esperto",
    "sabio", "quente", "frio", "fresco", "morno", "outono", "verao", "inverno", "primavera",
    "secreto", "oculto", "misterioso", "magico", "encantado",
];

const NOUNS: &[&str] = &[
    "gato", "cachorro", "passaro", "peixe", "coruja", "aguia", "falcao", "lobo", "raposa",
    "urso", "tigre", "leao", "pantera", "jaguar", "coelho", "esquilo", "castor", "lontra",
    "foca", "golfinho", "baleia", "pato", "cisne", "flamingo", "tucano", "arara", "papagaio",
    "rio", "lago", "mar", "cachoeira", "fonte", "bosque", "jardim", "prado", "vale",
    "colina", "nuvem", "vento", "brisa", "trovao", "aurora", "estrela", "lua", "sol",
    "cometa", "galaxia", "nebulosa", "fogo", "agua", "terra", "cristal", "diamante", "rubi",
    "safira", "lirio", "tulipa", "orquidea", "girassol", "violeta", "carvalho", "cedro",
    "pinheiro", "sequoia", "oliveira", "dragao", "fenix", "unicornio", "grifo", "sereia",
    "fada", "elfo",
];

/// Check a slug a person asked for: 3 to 30 characters of `a-z`, `0-9`,
/// `.` and `_`, containing no reserved word.
pub fn validate_slug(slug: &str) -> Result<()> {
    let well_formed = (MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&slug.len())
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_');
    if !well_formed {
        return Err(MailslotError::InvalidSlug(format!(
            "'{slug}' must be {MIN_SLUG_LEN}-{MAX_SLUG_LEN} characters of a-z, 0-9, '.' and '_'"
        )));
    }
    if is_reserved(slug) {
        return Err(MailslotError::InvalidSlug(format!("'{slug}' cannot be used")));
    }
    Ok(())
}

fn is_reserved(slug: &str) -> bool {
    let normalized = slug.replace(['.', '_'], "");
    RESERVED_WORDS.iter().any(|word| normalized.contains(word))
}

/// A memorable slug such as `corujaazul42`: noun, adjective, number below 100.
pub fn generate_slug() -> String {
    let mut rng = rand::rng();
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("caixa");
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("nova");
    let number: u8 = rng.random_range(0..100);
    format!("{noun}{adjective}{number}")
}
