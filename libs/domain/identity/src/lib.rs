// [libs/domain/identity/src/lib.rs]
/*!
 * =================================================================
 * APARATO: IDENTITY NORMALIZER
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CANONICALIZACIÓN DE IDENTIDADES IPA + AD TRUST
 *
 * # Logic:
 * Acepta tres formas de entrada (bare "jsmith", UPN "jsmith@dominio",
 * NT "DOMINIO\jsmith") y produce un principal canónico 'user@REALM'.
 * Para entradas bare se usa el primer dominio de la lista de prioridad
 * (bosques AD de confianza primero, directorio nativo al final). El
 * realm es el dominio resuelto en mayúsculas.
 * =================================================================
 */

pub mod normalizer;

pub use normalizer::{
    groups_match, normalize_group_name, IdentityFormat, IdentityNormalizer, NormalizedIdentity,
};
