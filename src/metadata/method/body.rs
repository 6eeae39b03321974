//! Parsing and writing of ECMA-335 method bodies.
//!
//! A method body is a header (tiny or fat), the raw code array, and for fat bodies any number
//! of extra data sections holding exception handling clauses. [`MethodBody::from`] parses the
//! binary form; [`MethodBody::to_bytes`] writes it back, choosing the tiny header whenever the
//! body allows it and the small clause layout whenever every clause fits.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Common Intermediate Language physical layout

use crate::{
    file::{io::push_le, parser::Parser},
    metadata::{
        method::{
            ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags,
            FAT_HEADER_SIZE, TINY_MAX_CODE_SIZE, TINY_MAX_STACK,
        },
        token::Token,
    },
    Error::OutOfBounds,
    Result,
};

const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;
const SECTION_HEADER_SIZE: usize = 4;

/// A parsed method body: header values, code and exception handling clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// The raw CIL code array
    pub code: Vec<u8>,
    /// Size of the header in bytes (1 for tiny, 12 for fat)
    pub size_header: usize,
    /// `StandAloneSig` token describing the locals, null if there are none
    pub local_var_sig_token: Token,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Whether the body uses a fat header
    pub is_fat: bool,
    /// Whether locals are zero-initialized on entry
    pub is_init_local: bool,
    /// Exception handling clauses in table order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Create a body from its parts. The header format is decided when writing.
    #[must_use]
    pub fn new(
        code: Vec<u8>,
        max_stack: u16,
        local_var_sig_token: Token,
        is_init_local: bool,
        exception_handlers: Vec<ExceptionHandler>,
    ) -> Self {
        let is_fat = Self::needs_fat(
            code.len(),
            max_stack,
            local_var_sig_token,
            is_init_local,
            &exception_handlers,
        );
        MethodBody {
            code,
            size_header: if is_fat { FAT_HEADER_SIZE } else { 1 },
            local_var_sig_token,
            max_stack,
            is_fat,
            is_init_local,
            exception_handlers,
        }
    }

    /// Parse a method body from its binary representation.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown header format or a damaged data
    /// section, and [`crate::Error::OutOfBounds`] if `data` is shorter than the header claims.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let mut parser = Parser::new(data);
        let first_byte = parser.peek_byte()?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                parser.advance_by(1)?;
                let size_code = (first_byte >> 2) as usize;
                let code = parser.read_bytes(size_code)?.to_vec();

                Ok(MethodBody {
                    code,
                    size_header: 1,
                    local_var_sig_token: Token(0),
                    max_stack: TINY_MAX_STACK,
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                let first_duo = parser.read_le::<u16>()?;
                let size_header = ((first_duo >> 12) * 4) as usize;
                if size_header < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat header declares {} bytes, expected at least {}",
                        size_header,
                        FAT_HEADER_SIZE
                    ));
                }

                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000_1111_1111_1111_u16);
                let max_stack = parser.read_le::<u16>()?;
                let size_code = parser.read_le::<u32>()? as usize;
                let local_var_sig_token = Token(parser.read_le::<u32>()?);

                parser.seek(size_header)?;
                let code = parser.read_bytes(size_code)?.to_vec();

                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::parse_sections(&mut parser)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    // Exception Handling -> II.25.4.5 / II.25.4.6
    fn parse_sections(parser: &mut Parser) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();

        loop {
            parser.align(4)?;
            let section_flags = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                return Err(malformed_error!(
                    "Unsupported method data section - {:?}",
                    section_flags
                ));
            }

            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let lo = u32::from(parser.read_le::<u16>()?);
                let hi = u32::from(parser.read_le::<u8>()?);
                let section_size = (lo | (hi << 16)) as usize;
                if section_size < SECTION_HEADER_SIZE
                    || (section_size - SECTION_HEADER_SIZE) % FAT_CLAUSE_SIZE != 0
                {
                    return Err(malformed_error!("Invalid fat EH section size - {}", section_size));
                }

                for _ in 0..(section_size - SECTION_HEADER_SIZE) / FAT_CLAUSE_SIZE {
                    // Only the low 16 bits of the fat flags field carry meaning
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = ExceptionHandlerFlags::from_bits_truncate(
                        parser.read_le::<u32>()? as u16,
                    );
                    exception_handlers.push(ExceptionHandler {
                        flags,
                        try_offset: parser.read_le::<u32>()?,
                        try_length: parser.read_le::<u32>()?,
                        handler_offset: parser.read_le::<u32>()?,
                        handler_length: parser.read_le::<u32>()?,
                        filter_offset: parser.read_le::<u32>()?,
                    });
                }
            } else {
                let section_size = parser.read_le::<u8>()? as usize;
                parser.advance_by(2)?;
                if section_size < SECTION_HEADER_SIZE
                    || (section_size - SECTION_HEADER_SIZE) % SMALL_CLAUSE_SIZE != 0
                {
                    return Err(malformed_error!(
                        "Invalid small EH section size - {}",
                        section_size
                    ));
                }

                for _ in 0..(section_size - SECTION_HEADER_SIZE) / SMALL_CLAUSE_SIZE {
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u16>()?),
                        try_offset: u32::from(parser.read_le::<u16>()?),
                        try_length: u32::from(parser.read_le::<u8>()?),
                        handler_offset: u32::from(parser.read_le::<u16>()?),
                        handler_length: u32::from(parser.read_le::<u8>()?),
                        filter_offset: parser.read_le::<u32>()?,
                    });
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
        }

        Ok(exception_handlers)
    }

    fn needs_fat(
        code_len: usize,
        max_stack: u16,
        local_var_sig_token: Token,
        is_init_local: bool,
        exception_handlers: &[ExceptionHandler],
    ) -> bool {
        code_len > TINY_MAX_CODE_SIZE
            || max_stack > TINY_MAX_STACK
            || !local_var_sig_token.is_null()
            || is_init_local
            || !exception_handlers.is_empty()
    }

    /// Write the body in binary form.
    ///
    /// A tiny header is used when the code is at most 63 bytes, the stack at most 8 deep,
    /// and there are no locals and no exception clauses. Exception clauses are written in
    /// a single small section when every clause fits, in a fat section otherwise.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the code or the clause table is too large to
    /// be described by a fat header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FAT_HEADER_SIZE + self.code.len());

        if !Self::needs_fat(
            self.code.len(),
            self.max_stack,
            self.local_var_sig_token,
            self.is_init_local,
            &self.exception_handlers,
        ) {
            // Code length is at most 63 here, so the shift cannot overflow
            #[allow(clippy::cast_possible_truncation)]
            out.push(((self.code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
            out.extend_from_slice(&self.code);
            return Ok(out);
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.is_init_local {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        let size_code = u32::try_from(self.code.len()).map_err(|_| OutOfBounds)?;
        push_le(&mut out, flags.bits() | ((FAT_HEADER_SIZE as u16 / 4) << 12));
        push_le(&mut out, self.max_stack);
        push_le(&mut out, size_code);
        push_le(&mut out, self.local_var_sig_token.value());
        out.extend_from_slice(&self.code);

        if self.exception_handlers.is_empty() {
            return Ok(out);
        }

        while out.len() % 4 != 0 {
            out.push(0);
        }

        let small_size =
            SECTION_HEADER_SIZE + self.exception_handlers.len() * SMALL_CLAUSE_SIZE;
        let use_small = small_size <= usize::from(u8::MAX)
            && self.exception_handlers.iter().all(ExceptionHandler::fits_small);

        if use_small {
            out.push(SectionFlags::EHTABLE.bits());
            #[allow(clippy::cast_possible_truncation)]
            out.push(small_size as u8);
            push_le(&mut out, 0_u16);

            #[allow(clippy::cast_possible_truncation)]
            for clause in &self.exception_handlers {
                push_le(&mut out, clause.flags.bits());
                push_le(&mut out, clause.try_offset as u16);
                push_le(&mut out, clause.try_length as u8);
                push_le(&mut out, clause.handler_offset as u16);
                push_le(&mut out, clause.handler_length as u8);
                push_le(&mut out, clause.filter_offset);
            }
        } else {
            let fat_size = SECTION_HEADER_SIZE + self.exception_handlers.len() * FAT_CLAUSE_SIZE;
            if fat_size > 0x00FF_FFFF {
                return Err(OutOfBounds);
            }

            out.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
            #[allow(clippy::cast_possible_truncation)]
            {
                push_le(&mut out, fat_size as u16);
                push_le(&mut out, (fat_size >> 16) as u8);
            }

            for clause in &self.exception_handlers {
                push_le(&mut out, u32::from(clause.flags.bits()));
                push_le(&mut out, clause.try_offset);
                push_le(&mut out, clause.try_length);
                push_le(&mut out, clause.handler_offset);
                push_le(&mut out, clause.handler_length);
                push_le(&mut out, clause.filter_offset);
            }
        }

        Ok(out)
    }

    /// Size of the code array in bytes.
    #[must_use]
    pub fn size_code(&self) -> usize {
        self.code.len()
    }

    /// Size of header plus code in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.code.len() + self.size_header
    }
}
