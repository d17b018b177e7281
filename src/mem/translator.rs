//! Physical address decoding.
//!
//! The translator maps a flat physical byte address to device coordinates
//! (channel, rank, bank, row, column) and back. Field extraction is a
//! chain of divide and modulo operations over the configured field order,
//! so field sizes do not have to be powers of two. The sub-line offset is
//! carried through as a bit address, making `reverse_translate` the exact
//! inverse of `translate` for every address.

use crate::config::SharedParams;
use crate::error::SimError;
use crate::mem::request::DeviceAddr;

/// One decoded address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Row,
    Col,
    Bank,
    Rank,
    Channel,
}

impl Field {
    fn from_token(tok: &str) -> Option<Field> {
        match tok {
            "R" => Some(Field::Row),
            "C" => Some(Field::Col),
            "BK" => Some(Field::Bank),
            "RK" => Some(Field::Rank),
            "CH" => Some(Field::Channel),
            _ => None,
        }
    }
}

/// Field order and sizes resolved from `AddressMappingScheme`.
///
/// The scheme string lists fields most-significant first, colon
/// separated, e.g. `R:RK:BK:CH:C`.
#[derive(Debug, Clone)]
pub struct TranslationMethod {
    /// Fields least-significant first, paired with their element counts.
    order: Vec<(Field, u64)>,
    line_size: u64,
    mat_height: u64,
}

impl TranslationMethod {
    fn from_params(params: &SharedParams) -> Result<TranslationMethod, SimError> {
        let mut seen = Vec::new();
        for tok in params.address_mapping.split(':') {
            let field = Field::from_token(tok).ok_or_else(|| {
                SimError::Config(format!(
                    "AddressMappingScheme has unknown field '{}' in '{}'",
                    tok, params.address_mapping
                ))
            })?;
            if seen.contains(&field) {
                return Err(SimError::Config(format!(
                    "AddressMappingScheme repeats field '{}' in '{}'",
                    tok, params.address_mapping
                )));
            }
            seen.push(field);
        }

        if seen.len() != 5 {
            return Err(SimError::Config(format!(
                "AddressMappingScheme '{}' must name all of R, C, BK, RK, CH",
                params.address_mapping
            )));
        }

        let count = |f: Field| match f {
            Field::Row => params.rows,
            Field::Col => params.cols,
            Field::Bank => params.banks,
            Field::Rank => params.ranks,
            Field::Channel => params.channels,
        };

        // Stored least-significant first for the divide/modulo chain.
        let order = seen.into_iter().rev().map(|f| (f, count(f))).collect();

        Ok(TranslationMethod {
            order,
            line_size: params.line_size,
            mat_height: params.mat_height,
        })
    }
}

/// Maps physical addresses to device coordinates and back.
pub struct AddressTranslator {
    method: TranslationMethod,
}

impl AddressTranslator {
    pub fn new(params: &SharedParams) -> Result<AddressTranslator, SimError> {
        Ok(AddressTranslator {
            method: TranslationMethod::from_params(params)?,
        })
    }

    /// Decodes a physical byte address.
    pub fn translate(&self, physical: u64) -> DeviceAddr {
        let mut addr = DeviceAddr {
            physical,
            bit: (physical % self.method.line_size) * 8,
            ..DeviceAddr::default()
        };

        let mut rest = physical / self.method.line_size;
        for &(field, count) in &self.method.order {
            let value = rest % count;
            rest /= count;
            match field {
                Field::Row => addr.row = value,
                Field::Col => addr.col = value,
                Field::Bank => addr.bank = value,
                Field::Rank => addr.rank = value,
                Field::Channel => addr.channel = value,
            }
        }

        addr.subarray = addr.row / self.method.mat_height;
        addr
    }

    /// Reassembles the physical byte address from device coordinates.
    pub fn reverse_translate(&self, addr: &DeviceAddr) -> u64 {
        let mut line = 0u64;
        for &(field, count) in self.method.order.iter().rev() {
            let value = match field {
                Field::Row => addr.row,
                Field::Col => addr.col,
                Field::Bank => addr.bank,
                Field::Rank => addr.rank,
                Field::Channel => addr.channel,
            };
            line = line * count + value;
        }
        line * self.method.line_size + addr.bit / 8
    }
}
