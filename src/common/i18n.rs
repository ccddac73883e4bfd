// src/common/i18n.rs

use std::{collections::HashMap, sync::OnceLock};

pub const DEFAULT_LANG: &str = "es";

// Catálogo de mensagens por idioma: (chave, texto)
const ES: &[(&str, &str)] = &[
    ("validation", "Uno o más campos no son válidos."),
    ("domain_rule", "La operación no está permitida."),
    ("forbidden", "No tiene el permiso '{permission}' para realizar esta acción."),
    ("not_found", "El registro solicitado no existe."),
    ("version_conflict", "El registro fue modificado por otro usuario. Recargue e intente de nuevo."),
    ("email_taken", "Este correo electrónico ya está en uso."),
    ("invalid_credentials", "Correo o contraseña inválidos."),
    ("invalid_token", "Token de autenticación inválido o ausente."),
    ("user_not_found", "Usuario no encontrado."),
    ("internal", "Ocurrió un error inesperado."),
];

const EN: &[(&str, &str)] = &[
    ("validation", "One or more fields are invalid."),
    ("domain_rule", "The operation is not allowed."),
    ("forbidden", "You need the '{permission}' permission to perform this action."),
    ("not_found", "The requested record does not exist."),
    ("version_conflict", "The record was changed by another user. Reload and try again."),
    ("email_taken", "This e-mail is already in use."),
    ("invalid_credentials", "Invalid e-mail or password."),
    ("invalid_token", "Invalid or missing authentication token."),
    ("user_not_found", "User not found."),
    ("internal", "An unexpected error occurred."),
];

const PT: &[(&str, &str)] = &[
    ("validation", "Um ou mais campos são inválidos."),
    ("domain_rule", "A operação não é permitida."),
    ("forbidden", "Você precisa da permissão '{permission}' para realizar esta ação."),
    ("not_found", "O registro solicitado não existe."),
    ("version_conflict", "O registro foi alterado por outro usuário. Recarregue e tente novamente."),
    ("email_taken", "Este e-mail já está em uso."),
    ("invalid_credentials", "E-mail ou senha inválidos."),
    ("invalid_token", "Token de autenticação inválido ou ausente."),
    ("user_not_found", "Usuário não encontrado."),
    ("internal", "Ocorreu um erro inesperado."),
];

#[derive(Debug)]
pub struct I18nStore {
    messages: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl Default for I18nStore {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nStore {
    pub fn new() -> Self {
        let mut messages = HashMap::new();
        for (lang, table) in [("es", ES), ("en", EN), ("pt", PT)] {
            messages.insert(lang, table.iter().copied().collect());
        }
        Self { messages }
    }

    /// Instância global, para quem não tem acesso ao AppState (extratores).
    pub fn shared() -> &'static I18nStore {
        static STORE: OnceLock<I18nStore> = OnceLock::new();
        STORE.get_or_init(I18nStore::new)
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.messages.contains_key(lang)
    }

    // Idioma desconhecido cai no padrão; chave desconhecida volta a própria chave
    pub fn translate(&self, lang: &str, key: &str) -> String {
        self.messages
            .get(lang)
            .and_then(|table| table.get(key))
            .or_else(|| self.messages.get(DEFAULT_LANG).and_then(|t| t.get(key)))
            .map(|s| s.to_string())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn translate_with(&self, lang: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.translate(lang, key);
        for (name, value) in args {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_language() {
        let store = I18nStore::new();
        assert_eq!(
            store.translate("de", "not_found"),
            store.translate(DEFAULT_LANG, "not_found")
        );
    }

    #[test]
    fn unknown_key_returns_key() {
        assert_eq!(I18nStore::new().translate("es", "nope"), "nope");
    }

    #[test]
    fn substitutes_named_arguments() {
        let text = I18nStore::new().translate_with("pt", "forbidden", &[("permission", "banks.view")]);
        assert!(text.contains("'banks.view'"));
        assert!(!text.contains("{permission}"));
    }
}
