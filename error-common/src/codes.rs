// Stable error codes surfaced to API consumers.
// Codes are append-only: never renumber an existing constant.

pub mod conflict {
    pub const DUPLICATE_PHONE: &str = "CONFLICT_1001";
    pub const DUPLICATE_ROLE: &str = "CONFLICT_1002";
    pub const DUPLICATE_ASSIGNMENT: &str = "CONFLICT_1003";
    pub const RESOURCE_IN_USE: &str = "CONFLICT_1004";
    pub const DUPLICATE_PERMISSION: &str = "CONFLICT_1005";
    pub const DUPLICATE_RECORD: &str = "CONFLICT_1006";
    pub const DUPLICATE_EMAIL: &str = "CONFLICT_1007";
    pub const DUPLICATE_PERMISSION_GROUP: &str = "CONFLICT_1008";
}

pub mod authentication {
    pub const INVALID_CREDENTIALS: &str = "AUTH_2001";
    pub const TOKEN_INVALID: &str = "AUTH_2002";
    pub const REFRESH_REJECTED: &str = "AUTH_2003";
    pub const SESSION_INVALID: &str = "AUTH_2004";
    pub const MISSING_TOKEN: &str = "AUTH_2005";
}

pub mod authorization {
    pub const ACCESS_DENIED: &str = "AUTHZ_3001";
    pub const INSUFFICIENT_PERMISSIONS: &str = "AUTHZ_3002";
    pub const ACCOUNT_RESTRICTED: &str = "AUTHZ_3003";
    pub const ROLE_NOT_ASSIGNED: &str = "AUTHZ_3004";
    pub const PROTECTED_RESOURCE: &str = "AUTHZ_3005";
    pub const WRONG_ACTOR_KIND: &str = "AUTHZ_3006";
}

pub mod not_found {
    pub const USER: &str = "NOT_FOUND_4001";
    pub const ROLE: &str = "NOT_FOUND_4002";
    pub const PERMISSION: &str = "NOT_FOUND_4003";
    pub const RESOURCE: &str = "NOT_FOUND_4004";
}

pub mod validation {
    pub const INVALID_INPUT: &str = "VALIDATION_5001";
    pub const ACTOR_KIND_MISMATCH: &str = "VALIDATION_5002";
}

pub mod internal {
    pub const STORAGE: &str = "INTERNAL_9001";
    pub const HASHING: &str = "INTERNAL_9002";
    pub const TOKEN_SIGNING: &str = "INTERNAL_9003";
    pub const CONFIGURATION: &str = "INTERNAL_9004";
}
