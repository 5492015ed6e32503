//! Legacy DC hash sent in the client handshake.
//!
//! The accumulator is the prime-weighted sum used by the legacy Panda/Bamboo
//! tooling. The traversal below is deterministic over the parsed schema;
//! deployments that must match a specific cluster build can pin the value in
//! configuration instead.

use std::collections::HashMap;

use crate::schema::{ArrayLength, DataType, Declaration, Field, KeywordSet, Schema};
use crate::syntax::Keyword;

const MAX_PRIME_NUMBERS: usize = 10_000;

/// Accumulates a 32-bit hash as `sum(prime(i) * value_i)`.
#[derive(Debug, Clone)]
pub struct HashGenerator {
    primes: Vec<u32>,
    hash: u32,
    index: usize,
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self {
            primes: vec![2],
            hash: 0,
            index: 0,
        }
    }
}

impl HashGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_int(&mut self, value: u32) {
        let prime = self.prime(self.index);
        self.hash = self.hash.wrapping_add(prime.wrapping_mul(value));
        self.index = (self.index + 1) % MAX_PRIME_NUMBERS;
    }

    /// Length first, then every byte.
    pub fn add_string(&mut self, text: &str) {
        self.add_int(text.len() as u32);
        for byte in text.bytes() {
            self.add_int(u32::from(byte));
        }
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// The `n`th prime, zero-based.
    fn prime(&mut self, n: usize) -> u32 {
        let mut candidate = self.primes[self.primes.len() - 1] + 1;
        while self.primes.len() <= n {
            let is_prime = self
                .primes
                .iter()
                .take_while(|&&p| p * p <= candidate)
                .all(|&p| candidate % p != 0);
            if is_prime {
                self.primes.push(candidate);
            }
            candidate += 1;
        }
        self.primes[n]
    }
}

impl Schema {
    /// Handshake hash of this schema.
    pub fn legacy_hash(&self) -> u32 {
        let mut generator = HashGenerator::new();
        LegacyHasher::new(self, &mut generator).hash_schema();
        generator.hash()
    }
}

struct LegacyHasher<'a> {
    schema: &'a Schema,
    generator: &'a mut HashGenerator,
    /// Structs and classes share one type index, in declaration order.
    type_index: HashMap<&'a str, u32>,
}

impl<'a> LegacyHasher<'a> {
    fn new(schema: &'a Schema, generator: &'a mut HashGenerator) -> Self {
        let type_index = schema
            .declarations
            .iter()
            .filter_map(declaration_name)
            .enumerate()
            .map(|(index, name)| (name, index as u32))
            .collect();

        Self {
            schema,
            generator,
            type_index,
        }
    }

    fn hash_schema(&mut self) {
        let schema = self.schema;
        self.generator.add_int(1);
        self.generator.add_int(self.type_index.len() as u32);

        for declaration in &schema.declarations {
            match declaration {
                Declaration::Struct(s) => {
                    self.generator.add_string(&s.name);
                    self.generator.add_int(0);
                    self.hash_fields(&s.fields);
                }
                Declaration::Class(c) => {
                    self.generator.add_string(&c.name);
                    self.generator.add_int(c.parents.len() as u32);
                    for parent in &c.parents {
                        let index = self.index_of(parent);
                        self.generator.add_int(index);
                    }
                    self.hash_fields(c.own_fields());
                }
                Declaration::Typedef(_) | Declaration::Import(_) => {}
            }
        }
    }

    fn hash_fields(&mut self, fields: &[Field]) {
        self.generator.add_int(fields.len() as u32);
        for field in fields {
            self.hash_field(field);
        }
    }

    fn hash_field(&mut self, field: &Field) {
        match field {
            Field::Molecular(f) => {
                self.generator.add_string(&f.name);
                self.generator.add_int(u32::from(f.id));
                self.generator.add_int(f.component_ids.len() as u32);
                for id in &f.component_ids {
                    self.generator.add_int(u32::from(*id));
                }
            }
            Field::Atomic(f) => {
                self.hash_keywords(&f.keywords);
                self.generator.add_string(&f.name);
                self.generator.add_int(u32::from(f.id));
                self.generator.add_int(1);
                self.hash_type(&f.data_type);
            }
            Field::Method(f) => {
                self.hash_keywords(&f.keywords);
                self.generator.add_string(&f.name);
                self.generator.add_int(u32::from(f.id));
                self.generator.add_int(f.parameters.len() as u32);
                for parameter in &f.parameters {
                    self.hash_type(&parameter.data_type);
                }
            }
        }
    }

    fn hash_keywords(&mut self, keywords: &KeywordSet) {
        let custom: Vec<&Keyword> = keywords
            .iter()
            .filter(|k| matches!(k, Keyword::Custom(_)))
            .collect();
        if custom.is_empty() {
            let flags = keywords.iter().fold(0, |acc, k| acc | k.legacy_flag());
            self.generator.add_int(flags);
        } else {
            self.generator.add_int(keywords.len() as u32);
            for keyword in keywords {
                self.generator.add_string(keyword.name());
            }
        }
    }

    fn hash_type(&mut self, data_type: &DataType) {
        match data_type {
            DataType::Primitive(p) => {
                self.generator.add_int(p.legacy_code());
                if p.is_integer() {
                    // divisor
                    self.generator.add_int(1);
                }
            }
            DataType::Struct(name) => {
                let index = self.index_of(name);
                self.generator.add_int(index);
            }
            DataType::Array { element, length } => {
                match length {
                    ArrayLength::Fixed(n) => self.generator.add_int(u32::from(*n)),
                    ArrayLength::Variable => self.generator.add_int(0),
                }
                self.hash_type(element);
            }
        }
    }

    fn index_of(&self, name: &str) -> u32 {
        self.type_index.get(name).copied().unwrap_or(u32::MAX)
    }
}

fn declaration_name(declaration: &Declaration) -> Option<&str> {
    match declaration {
        Declaration::Struct(s) => Some(&s.name),
        Declaration::Class(c) => Some(&c.name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;

    #[test]
    fn test_first_primes() {
        let mut generator = HashGenerator::new();
        let primes: Vec<u32> = (0..10).map(|n| generator.prime(n)).collect();
        assert_eq!(primes, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(generator.prime(9_999), 104_729);
    }

    #[test]
    fn test_add_int_weights_by_prime() {
        let mut generator = HashGenerator::new();
        generator.add_int(1);
        generator.add_int(10);
        generator.add_int(100);
        assert_eq!(generator.hash(), 2 + 30 + 500);
    }

    #[test]
    fn test_add_string_hashes_length_then_bytes() {
        let mut generator = HashGenerator::new();
        generator.add_string("ab");
        assert_eq!(generator.hash(), 2 * 2 + 3 * 97 + 5 * 98);
    }

    #[test]
    fn test_hash_wraps_to_32_bits() {
        let mut generator = HashGenerator::new();
        generator.add_int(u32::MAX);
        generator.add_int(u32::MAX);
        // 5 * u32::MAX wraps to u32::MAX - 4
        assert_eq!(generator.hash(), u32::MAX - 4);
    }

    #[test]
    fn test_schema_hash_is_stable() {
        let source = "dclass A {\n    uint8 a required;\n    setB(string) broadcast;\n};\n";
        let first = parse_str(source).unwrap().legacy_hash();
        let second = parse_str(source).unwrap().legacy_hash();
        assert_eq!(first, second);
    }

    #[test]
    fn test_schema_hash_sees_keyword_changes() {
        let plain = parse_str("dclass A {\n    uint8 a required;\n};\n").unwrap();
        let broadcast = parse_str("dclass A {\n    uint8 a required broadcast;\n};\n").unwrap();
        assert_ne!(plain.legacy_hash(), broadcast.legacy_hash());
    }
}
