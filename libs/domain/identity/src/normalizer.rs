// [libs/domain/identity/src/normalizer.rs]
/*!
 * =================================================================
 * APARATO: IDENTITY NORMALIZER CORE
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: PARSEO, RESOLUCIÓN DE DOMINIO Y EMPAREJADO DE GRUPOS
 * =================================================================
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Forma en la que llegó la identidad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFormat {
    /// Solo usuario: "jsmith".
    Bare,
    /// user@dominio: "jsmith@neopost.grp".
    Upn,
    /// DOMINIO\usuario: "NEOPOST\jsmith".
    NtStyle,
}

/// Identidad normalizada e inmutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    /// Principal completo: user@REALM.
    pub canonical_principal: String,
    /// Parte de usuario en minúsculas.
    pub username: String,
    /// Realm Kerberos en mayúsculas.
    pub realm: String,
    /// Dominio en minúsculas.
    pub domain: String,
    /// true si proviene de un bosque AD de confianza.
    pub is_ad_trust: bool,
    pub original_format: IdentityFormat,
    pub original_input: String,
}

impl std::fmt::Display for NormalizedIdentity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.canonical_principal)
    }
}

/// Normalizador de identidades entre el directorio nativo y los
/// dominios AD de confianza.
#[derive(Debug, Clone)]
pub struct IdentityNormalizer {
    ipa_realm: String,
    ipa_domain: String,
    trusted_domains: Vec<String>,
    domain_priority: Vec<String>,
    domain_to_realm: HashMap<String, String>,
    nt_domain_aliases: HashMap<String, String>,
    /// Modo permisivo: un dominio desconocido sin dominios de confianza
    /// configurados se clasifica como AD trust. Apagado por defecto.
    permissive_trust: bool,
}

impl IdentityNormalizer {
    /// Alias NT conocidos hacia sus dominios completos.
    fn default_nt_aliases() -> HashMap<String, String> {
        let mut aliases = HashMap::new();
        aliases.insert("NEOPOST".to_string(), "neopost.grp".to_string());
        aliases.insert("NEOPOST-GRP".to_string(), "neopost.grp".to_string());
        aliases.insert("NEOPOSTAD".to_string(), "neopost.ad".to_string());
        aliases.insert("NEOPOST-AD".to_string(), "neopost.ad".to_string());
        aliases
    }

    pub fn new(
        ipa_realm: &str,
        ipa_domain: &str,
        trusted_domains: Vec<String>,
        domain_priority: Option<Vec<String>>,
    ) -> Self {
        let ipa_realm = ipa_realm.to_uppercase();
        let ipa_domain = ipa_domain.to_lowercase();
        let trusted_domains: Vec<String> =
            trusted_domains.iter().map(|domain| domain.to_lowercase()).collect();

        // Prioridad por defecto: bosques AD en orden, el nativo al final.
        let domain_priority = match domain_priority {
            Some(explicit) => explicit.iter().map(|domain| domain.to_lowercase()).collect(),
            None => {
                let mut priority = trusted_domains.clone();
                priority.push(ipa_domain.clone());
                priority
            }
        };

        let mut domain_to_realm = HashMap::new();
        domain_to_realm.insert(ipa_domain.clone(), ipa_realm.clone());
        for domain in &trusted_domains {
            domain_to_realm.insert(domain.clone(), domain.to_uppercase());
        }

        Self {
            ipa_realm,
            ipa_domain,
            trusted_domains,
            domain_priority,
            domain_to_realm,
            nt_domain_aliases: Self::default_nt_aliases(),
            permissive_trust: false,
        }
    }

    /// Activa el modo permisivo (decisión registrada en DESIGN.md).
    pub fn with_permissive_trust(mut self, enabled: bool) -> Self {
        self.permissive_trust = enabled;
        self
    }

    pub fn ipa_realm(&self) -> &str {
        &self.ipa_realm
    }

    pub fn ipa_domain(&self) -> &str {
        &self.ipa_domain
    }

    /// Normaliza una identidad en cualquiera de las tres formas.
    pub fn normalize(&self, identity: &str) -> NormalizedIdentity {
        let original_input = identity.trim().to_string();

        let (username, parsed_domain, original_format) = self.parse_identity(&original_input);

        let domain = match parsed_domain {
            Some(domain) => domain.to_lowercase(),
            None => self
                .domain_priority
                .first()
                .cloned()
                .unwrap_or_else(|| self.ipa_domain.clone()),
        };

        let realm = self.realm_for_domain(&domain);

        let is_ad_trust = if domain == self.ipa_domain {
            false
        } else if self.trusted_domains.is_empty() && !self.permissive_trust {
            // Sin bosques configurados el dominio ajeno no se asume trust.
            domain != self.ipa_domain && self.domain_to_realm.contains_key(&domain)
        } else {
            true
        };

        NormalizedIdentity {
            canonical_principal: format!("{}@{}", username, realm),
            username,
            realm,
            domain,
            is_ad_trust,
            original_format,
            original_input,
        }
    }

    /// Separa usuario y dominio detectando la forma de entrada.
    fn parse_identity(&self, identity: &str) -> (String, Option<String>, IdentityFormat) {
        // Forma NT: DOMINIO\usuario
        if let Some((nt_domain, username)) = identity.split_once('\\') {
            let domain = self.resolve_nt_domain(nt_domain);
            return (username.to_lowercase(), Some(domain), IdentityFormat::NtStyle);
        }

        // Forma UPN: usuario@dominio (el último '@' separa).
        if let Some(at_position) = identity.rfind('@') {
            let (username, domain_with_at) = identity.split_at(at_position);
            let domain = &domain_with_at[1..];
            if !username.is_empty() && !domain.is_empty() {
                return (
                    username.to_lowercase(),
                    Some(domain.to_lowercase()),
                    IdentityFormat::Upn,
                );
            }
        }

        (identity.to_lowercase(), None, IdentityFormat::Bare)
    }

    /// Resuelve un prefijo NT a dominio completo: mapa estático primero,
    /// luego primera etiqueta de los dominios de confianza.
    fn resolve_nt_domain(&self, nt_domain: &str) -> String {
        let nt_upper = nt_domain.to_uppercase();

        if let Some(mapped) = self.nt_domain_aliases.get(&nt_upper) {
            return mapped.clone();
        }

        for domain in &self.trusted_domains {
            let first_label = domain.split('.').next().unwrap_or_default().to_uppercase();
            if nt_upper == first_label {
                return domain.clone();
            }
        }

        nt_domain.to_lowercase()
    }

    /// Realm Kerberos para un dominio: mapa exacto, sufijo conocido,
    /// o el propio dominio en mayúsculas.
    fn realm_for_domain(&self, domain: &str) -> String {
        let domain = domain.to_lowercase();

        if let Some(realm) = self.domain_to_realm.get(&domain) {
            return realm.clone();
        }

        for (known_domain, realm) in &self.domain_to_realm {
            if domain == *known_domain || domain.ends_with(&format!(".{}", known_domain)) {
                return realm.clone();
            }
        }

        domain.to_uppercase()
    }

    pub fn is_ad_trust_domain(&self, domain: &str) -> bool {
        self.trusted_domains.contains(&domain.to_lowercase())
    }

    /// Todos los principales posibles para un usuario bare, en orden de prioridad.
    pub fn all_possible_principals(&self, username: &str) -> Vec<String> {
        self.domain_priority
            .iter()
            .map(|domain| format!("{}@{}", username, self.realm_for_domain(domain)))
            .collect()
    }
}

/// Canonicaliza un nombre de grupo desde DN completo, forma NT o nombre simple.
///
/// "cn=admins,cn=groups,dc=x,dc=y" → "admins"; "DOM\Ops" → "ops";
/// "ops@dominio" → "ops".
pub fn normalize_group_name(group_dn_or_name: &str) -> String {
    let mut name = group_dn_or_name.trim().to_string();
    if name.is_empty() {
        return name;
    }

    // DN LDAP: extraer el primer valor cn=.
    if name.len() >= 3 && name[..3].eq_ignore_ascii_case("cn=") {
        let value = &name[3..];
        name = match value.find(',') {
            Some(comma) => value[..comma].to_string(),
            None => value.to_string(),
        };
    }

    // Forma NT: DOMINIO\grupo.
    if let Some((_, suffix)) = name.split_once('\\') {
        name = suffix.to_string();
    }

    // Forma UPN: grupo@dominio.
    if let Some((prefix, _)) = name.split_once('@') {
        name = prefix.to_string();
    }

    name.trim().to_lowercase()
}

/// Emparejado de grupos: igualdad exacta tras canonicalización.
///
/// "cn=dsm-admins,..." empareja con "DSM-Admins" porque ambos
/// canonicalizan a "dsm-admins"; "admins" NO empareja con "dsm-admins".
pub fn groups_match(user_group: &str, mapping_group: &str) -> bool {
    let normalized_user = normalize_group_name(user_group);
    let normalized_mapping = normalize_group_name(mapping_group);

    !normalized_user.is_empty() && normalized_user == normalized_mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> IdentityNormalizer {
        IdentityNormalizer::new(
            "IDM.NEOPOST.GRP",
            "idm.neopost.grp",
            vec!["neopost.grp".to_string(), "neopost.ad".to_string()],
            None,
        )
    }

    #[test]
    fn bare_username_takes_first_priority_domain() {
        let identity = normalizer().normalize("jsmith");
        assert_eq!(identity.canonical_principal, "jsmith@NEOPOST.GRP");
        assert_eq!(identity.original_format, IdentityFormat::Bare);
        assert!(identity.is_ad_trust);
    }

    #[test]
    fn upn_against_native_directory_is_not_trust() {
        let identity = normalizer().normalize("jsmith@idm.neopost.grp");
        assert_eq!(identity.canonical_principal, "jsmith@IDM.NEOPOST.GRP");
        assert!(!identity.is_ad_trust);
    }

    #[test]
    fn nt_style_resolves_via_alias_map() {
        let identity = normalizer().normalize("NEOPOST\\JSmith");
        assert_eq!(identity.canonical_principal, "jsmith@NEOPOST.GRP");
        assert_eq!(identity.original_format, IdentityFormat::NtStyle);
    }

    #[test]
    fn nt_style_falls_back_to_trusted_domain_label() {
        let custom = IdentityNormalizer::new(
            "IDM.SITE.LOCAL",
            "idm.site.local",
            vec!["contoso.com".to_string()],
            None,
        );
        let identity = custom.normalize("CONTOSO\\amara");
        assert_eq!(identity.domain, "contoso.com");
        assert_eq!(identity.realm, "CONTOSO.COM");
    }

    #[test]
    fn normalization_is_idempotent_on_upn_output() {
        let normalizer = normalizer();
        let first = normalizer.normalize("jsmith");
        let second = normalizer.normalize(&first.canonical_principal.to_lowercase());
        assert_eq!(second.canonical_principal, first.canonical_principal);
    }

    #[test]
    fn all_principals_follow_priority_order() {
        let principals = normalizer().all_possible_principals("amara");
        assert_eq!(
            principals,
            vec![
                "amara@NEOPOST.GRP",
                "amara@NEOPOST.AD",
                "amara@IDM.NEOPOST.GRP"
            ]
        );
    }

    #[test]
    fn group_dn_matches_simple_name() {
        assert!(groups_match(
            "cn=dsm-admins,cn=groups,dc=x,dc=y",
            "DSM-Admins"
        ));
    }

    #[test]
    fn partial_group_names_do_not_match() {
        assert!(!groups_match("admins", "dsm-admins"));
        assert!(!groups_match("operators", "dsm-admins"));
        assert!(!groups_match("", ""));
    }

    #[test]
    fn nt_and_upn_group_forms_canonicalize() {
        assert_eq!(normalize_group_name("NEOPOST\\Server-Admins"), "server-admins");
        assert_eq!(normalize_group_name("ops@neopost.grp"), "ops");
        assert_eq!(normalize_group_name(""), "");
    }
}
