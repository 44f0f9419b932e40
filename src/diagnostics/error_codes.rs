//! Error code definitions
//!
//! Checker diagnostics use string codes (`E3xxx` errors, `W5xxx` warnings).
//! Runtime failures use the numeric `4xxx` range.

/// Type errors (E30xx)
pub mod types {
    pub const TYPE_MISMATCH: &str = "E3001";
    pub const UNKNOWN_IDENTIFIER: &str = "E3002";
    pub const EXPECTED_NUMERIC: &str = "E3003";
    pub const EXPECTED_BOOL: &str = "E3004";
    pub const EXPECTED_SET: &str = "E3005";
    pub const EXPECTED_SEQ: &str = "E3006";
    pub const EXPECTED_MAP: &str = "E3007";
    pub const EXPECTED_RECORD: &str = "E3008";
    pub const EXPECTED_TUPLE: &str = "E3009";
    pub const EXPECTED_FUNCTION: &str = "E3010";
    pub const EXPECTED_OBJECT: &str = "E3011";
    pub const UNKNOWN_FIELD: &str = "E3012";
    pub const WRONG_ARGUMENT_COUNT: &str = "E3013";
    pub const UNKNOWN_TYPE: &str = "E3014";
    pub const UNKNOWN_CLASS: &str = "E3015";
    pub const DIVISION_BY_ZERO: &str = "E3016";
    pub const TUPLE_INDEX_RANGE: &str = "E3017";
    pub const NOT_POLYMORPHIC: &str = "E3018";
    pub const WRONG_TYPE_PARAM_COUNT: &str = "E3019";
    pub const UNINSTANTIATED_POLYMORPHIC: &str = "E3020";
    pub const INCOMPATIBLE_OPERANDS: &str = "E3021";
    pub const DUPLICATE_PATTERN_NAME: &str = "E3022";
    pub const PATTERN_TYPE_MISMATCH: &str = "E3023";
    pub const UNBOUNDED_BIND: &str = "E3024";
    pub const STATE_NOT_ACCESSIBLE: &str = "E3025";
}

/// Class, access and purity errors (E31xx)
pub mod classes {
    pub const MEMBER_NOT_VISIBLE: &str = "E3101";
    pub const UNKNOWN_MEMBER: &str = "E3102";
    pub const OPERATION_IN_FUNCTION: &str = "E3103";
    pub const IMPURE_IN_PURE: &str = "E3104";
    pub const SELF_OUTSIDE_CLASS: &str = "E3105";
    pub const STATIC_ACCESS: &str = "E3106";
    pub const OLD_NAME_OUTSIDE_POST: &str = "E3107";
    pub const NO_MATCHING_OVERLOAD: &str = "E3108";
}

/// Warnings (W5xxx)
pub mod warnings {
    pub const IMPURE_IN_PURE: &str = "W5001";
    pub const UNUSED_BINDING: &str = "W5002";
    pub const REDUNDANT_NARROW: &str = "W5003";
    pub const EMPTY_RANGE: &str = "W5004";
    pub const MAY_FAIL: &str = "W5005";
}

/// Runtime failures (4xxx)
pub mod runtime {
    // Numeric trouble
    pub const DIVISION_BY_ZERO: u32 = 4001;
    pub const NUMERIC_TROUBLE: u32 = 4002;
    pub const POWER_TROUBLE: u32 = 4003;
    pub const EXPECTED_NUMERIC: u32 = 4004;
    pub const EXPECTED_INTEGER: u32 = 4005;
    pub const EXPECTED_NATURAL: u32 = 4006;

    // Value kind mismatches
    pub const EXPECTED_BOOL: u32 = 4010;
    pub const EXPECTED_SET: u32 = 4011;
    pub const EXPECTED_SEQ: u32 = 4012;
    pub const EXPECTED_MAP: u32 = 4013;
    pub const EXPECTED_RECORD: u32 = 4014;
    pub const EXPECTED_TUPLE: u32 = 4015;
    pub const EXPECTED_OBJECT: u32 = 4016;
    pub const EXPECTED_FUNCTION: u32 = 4017;
    pub const EXPECTED_CHAR: u32 = 4018;
    pub const INAPPLICABLE_VALUE: u32 = 4019;

    // Collections
    pub const INDEX_OUT_OF_RANGE: u32 = 4020;
    pub const EMPTY_SEQUENCE: u32 = 4021;
    pub const EMPTY_SET: u32 = 4022;
    pub const KEY_NOT_IN_DOMAIN: u32 = 4023;
    pub const DUPLICATE_MAP_KEY: u32 = 4024;
    pub const MAP_NOT_INJECTIVE: u32 = 4025;
    pub const NOT_A_SUBSET: u32 = 4026;
    pub const TUPLE_INDEX: u32 = 4027;
    pub const INCOMPATIBLE_MERGE: u32 = 4028;

    // Names, fields and objects
    pub const NAME_NOT_FOUND: u32 = 4030;
    pub const FIELD_NOT_FOUND: u32 = 4031;
    pub const MEMBER_NOT_FOUND: u32 = 4032;
    pub const NO_SELF: u32 = 4033;

    // Pattern matching and binding
    pub const NO_CASE_APPLIES: u32 = 4040;
    pub const PATTERN_MISMATCH: u32 = 4041;
    pub const LET_BE_ST_NO_MATCH: u32 = 4042;
    pub const IOTA_NO_RESULT: u32 = 4043;
    pub const IOTA_MULTIPLE_RESULTS: u32 = 4044;
    pub const TYPE_NOT_FINITE: u32 = 4045;
    pub const SEQ_COMP_NOT_NUMERIC: u32 = 4046;
    pub const ARITY_MISMATCH: u32 = 4047;

    // Contracts and types
    pub const PRECONDITION_FAILURE: u32 = 4050;
    pub const POSTCONDITION_FAILURE: u32 = 4051;
    pub const INVARIANT_VIOLATION: u32 = 4052;
    pub const TYPE_CONVERSION: u32 = 4053;
    pub const NOT_YET_SPECIFIED: u32 = 4054;
    pub const UNDEFINED_VALUE: u32 = 4055;
    pub const POLYMORPHIC_UNINSTANTIATED: u32 = 4056;
}

/// Returns true for runtime codes that signal a broken type invariant.
///
/// Narrowing forms (`is_`, `narrow_`) let these propagate while swallowing
/// every other failure.
pub fn is_invariant_code(code: u32) -> bool {
    code == runtime::INVARIANT_VIOLATION
}
