//! Prompt and reply templates
//!
//! Fixed texts the assistant speaks or sends to the chat provider. Templates
//! use `{name}`, `{address}` and `{user}` placeholders filled by [`render`];
//! the playlist texts also carry `{playlist}` / `{playlists}`.

/// Fill the placeholders of a template
pub fn render(template: &str, assistant_name: &str, address_form: &str, user: &str) -> String {
    template
        .replace("{name}", assistant_name)
        .replace("{address}", address_form)
        .replace("{user}", user)
}

/// Uppercase the first character, leaving the rest untouched
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Built-in texts that don't require files
pub mod builtin {
    /// System prompt for free chat
    pub const PERSONA: &str = "Eres {name}, un asistente personal por voz, cortés y eficiente. \
Te diriges al usuario como \"{address}\". Responde en español, de forma breve y natural, \
porque tus respuestas se leen en voz alta. No uses markdown ni listas largas.";

    /// Appended to the persona when the profile has a name
    pub const USER_NAME: &str = "El usuario se llama {user}.";

    /// Header for recalled memories in the system prompt
    pub const MEMORIES_HEADER: &str = "Datos que recuerdas del usuario:";

    /// Header for the running transcript in the system prompt
    pub const CONTEXT_HEADER: &str = "Conversación reciente:";

    /// Refusal when intelligent mode is off and functional mode is on
    pub const BLOCKED_FUNCTIONAL: &str = "Disculpe, {address}. El modo funcional está activo: \
solo ejecuto comandos básicos. Active el modo inteligente para que pueda ayudarle con esa petición.";

    /// Refusal when both modes are off
    pub const BLOCKED_NORMAL: &str = "Disculpe, {address}. El modo inteligente está desactivado. \
Actívelo para que pueda procesar su petición.";

    /// Free chat denied by the token budget
    pub const BUDGET_EXCEEDED: &str = "{address}, hemos alcanzado el límite de uso mensual de la \
inteligencia artificial. Puedo seguir ayudándole con el clima, la música y las imágenes hasta \
el próximo reinicio del presupuesto.";

    /// Weather backend unavailable
    pub const WEATHER_UNAVAILABLE: &str = "Lo siento, {address}, no he podido obtener la \
información del clima en este momento. Inténtelo de nuevo en unos minutos.";

    /// Image synthesized
    pub const IMAGE_READY: &str = "Aquí tiene la imagen que me pidió, {address}.";

    /// Playlist found
    pub const PLAYLIST_FOUND: &str = "Reproduciendo {playlist}, {address}.";

    /// Playlist not found
    pub const PLAYLIST_NOT_FOUND: &str = "No encontré esa lista, {address}. Las listas \
disponibles son: {playlists}. ¿Podría repetir cuál desea escuchar?";

    /// Empty catalog
    pub const PLAYLIST_EMPTY: &str = "No tiene listas de reproducción guardadas, {address}.";

    pub const APOLOGY_CONFIGURATION: &str = "hay un problema con la configuración de la clave \
de acceso al servicio de inteligencia artificial.";

    pub const APOLOGY_QUOTA: &str = "se ha agotado la cuota del servicio de inteligencia artificial.";

    pub const APOLOGY_NETWORK: &str = "no he podido conectar con el servicio. Compruebe la \
conexión a internet.";

    pub const APOLOGY_UNKNOWN: &str = "he tenido un problema técnico al procesar su petición.";

    pub const RETRY_INVITATION: &str = "Por favor, inténtelo de nuevo.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let text = render(builtin::PERSONA, "JARVIS", "señor", "");
        assert!(text.starts_with("Eres JARVIS"));
        assert!(text.contains("\"señor\""));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("señor"), "Señor");
        assert_eq!(capitalize("ñandú"), "Ñandú");
        assert_eq!(capitalize(""), "");
    }
}
