//! The persistent cache's binary wire format (spec §4.3, §6.2).
//!
//! Pure codec, no I/O: `ExternalCache` handles storage, `cache::SerializedCache`
//! orchestrates staleness/host-exclusion policy around this module.

use jitcore_environ::Error;

pub const MAGIC: &[u8; 6] = b"WAZERO";

/// One function's entry to serialize: its call-stack ceiling and raw code
/// bytes (spec §3 `CompiledFunction` attributes actually persisted).
pub struct SerializedFunction<'a> {
    pub stack_pointer_ceil: u64,
    pub code: &'a [u8],
}

/// Encode the header + per-function records spec §4.3 describes.
pub fn serialize(engine_version: &str, functions: &[SerializedFunction<'_>]) -> Vec<u8> {
    more_asserts::assert_le!(engine_version.len(), u8::MAX as usize);
    more_asserts::assert_le!(functions.len(), u32::MAX as usize);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(engine_version.len() as u8);
    out.extend_from_slice(engine_version.as_bytes());
    out.extend_from_slice(&(functions.len() as u32).to_le_bytes());
    for f in functions {
        out.extend_from_slice(&f.stack_pointer_ceil.to_le_bytes());
        out.extend_from_slice(&(f.code.len() as u64).to_le_bytes());
        out.extend_from_slice(f.code);
    }
    out
}

/// One function as parsed back out of a blob. The embedder zips this with
/// the signature/listener metadata it already knows for that index (not
/// part of the cache format) to rebuild a full `CompiledFunctionBuilder`.
pub struct DeserializedFunction {
    pub stack_pointer_ceil: u64,
    pub code: Vec<u8>,
}

pub enum Deserialized {
    /// The embedded version string didn't match; the caller must delete the
    /// external key and treat this as a miss (spec §4.3 Staleness).
    Stale,
    Functions(Vec<DeserializedFunction>),
}

/// Parse a blob produced by `serialize`, checking staleness first (spec
/// §4.3 Read path: "parse header -> if stale, delete and return miss").
pub fn deserialize(bytes: &[u8], engine_version: &str) -> Result<Deserialized, Error> {
    const FIXED_MIN: usize = 6 + 1; // magic + version_length byte
    if bytes.len() < FIXED_MIN {
        return Err(Error::MalformedCache(format!(
            "invalid header length: {}",
            bytes.len()
        )));
    }
    if &bytes[0..6] != MAGIC {
        return Err(Error::MalformedCache("bad magic".to_string()));
    }

    let version_len = bytes[6] as usize;
    let header_len = FIXED_MIN + version_len + 4;
    if bytes.len() < header_len {
        return Err(Error::MalformedCache(format!(
            "invalid header length: {}",
            bytes.len()
        )));
    }
    let version = std::str::from_utf8(&bytes[7..7 + version_len])
        .map_err(|_| Error::MalformedCache("engine version is not valid UTF-8".to_string()))?;
    if version != engine_version {
        return Ok(Deserialized::Stale);
    }

    let count_offset = 7 + version_len;
    let function_count =
        u32::from_le_bytes(bytes[count_offset..count_offset + 4].try_into().unwrap()) as usize;

    let mut cursor = count_offset + 4;
    let mut functions = Vec::with_capacity(function_count);
    for index in 0..function_count {
        let ceil_end = cursor + 8;
        if ceil_end > bytes.len() {
            return Err(Error::MalformedCache(format!(
                "truncated stack_pointer_ceil for function {index}"
            )));
        }
        let stack_pointer_ceil = u64::from_le_bytes(bytes[cursor..ceil_end].try_into().unwrap());
        cursor = ceil_end;

        let len_end = cursor + 8;
        if len_end > bytes.len() {
            return Err(Error::MalformedCache(format!(
                "truncated code_segment_length for function {index}"
            )));
        }
        let code_len = u64::from_le_bytes(bytes[cursor..len_end].try_into().unwrap()) as usize;
        cursor = len_end;

        let code_end = cursor + code_len;
        if code_end > bytes.len() {
            return Err(Error::MalformedCache(format!(
                "truncated code bytes for function {index}"
            )));
        }
        functions.push(DeserializedFunction {
            stack_pointer_ceil,
            code: bytes[cursor..code_end].to_vec(),
        });
        cursor = code_end;
    }

    Ok(Deserialized::Functions(functions))
}
