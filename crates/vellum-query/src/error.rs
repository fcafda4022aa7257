use std::fmt;

/// Error kinds used on the wire and in per-document error accounting.
///
/// Each kind has a stable numeric code carried in response bodies as
/// `errorNum` and used as the key of batch error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoError,
    OutOfMemory,
    Internal,
    NotImplemented,
    BadParameter,
    Conflict,
    DocumentNotFound,
    CollectionNotFound,
    DocumentHandleBad,
    UniqueConstraintViolated,
    IndexNotFound,
    IndexHandleBad,
    CollectionTypeInvalid,
    DocumentKeyBad,
    DocumentTypeInvalid,
    OnlyOnDbServer,
    TransactionInternal,
    TransactionNested,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NoError => 0,
            ErrorKind::OutOfMemory => 3,
            ErrorKind::Internal => 4,
            ErrorKind::NotImplemented => 9,
            ErrorKind::BadParameter => 10,
            ErrorKind::Conflict => 1200,
            ErrorKind::DocumentNotFound => 1202,
            ErrorKind::CollectionNotFound => 1203,
            ErrorKind::DocumentHandleBad => 1205,
            ErrorKind::UniqueConstraintViolated => 1210,
            ErrorKind::IndexNotFound => 1212,
            ErrorKind::IndexHandleBad => 1214,
            ErrorKind::CollectionTypeInvalid => 1218,
            ErrorKind::DocumentKeyBad => 1221,
            ErrorKind::DocumentTypeInvalid => 1227,
            ErrorKind::OnlyOnDbServer => 1477,
            ErrorKind::TransactionInternal => 1650,
            ErrorKind::TransactionNested => 1651,
        }
    }

    pub fn from_code(code: i32) -> Option<ErrorKind> {
        Some(match code {
            0 => ErrorKind::NoError,
            3 => ErrorKind::OutOfMemory,
            4 => ErrorKind::Internal,
            9 => ErrorKind::NotImplemented,
            10 => ErrorKind::BadParameter,
            1200 => ErrorKind::Conflict,
            1202 => ErrorKind::DocumentNotFound,
            1203 => ErrorKind::CollectionNotFound,
            1205 => ErrorKind::DocumentHandleBad,
            1210 => ErrorKind::UniqueConstraintViolated,
            1212 => ErrorKind::IndexNotFound,
            1214 => ErrorKind::IndexHandleBad,
            1218 => ErrorKind::CollectionTypeInvalid,
            1221 => ErrorKind::DocumentKeyBad,
            1227 => ErrorKind::DocumentTypeInvalid,
            1477 => ErrorKind::OnlyOnDbServer,
            1650 => ErrorKind::TransactionInternal,
            1651 => ErrorKind::TransactionNested,
            _ => return None,
        })
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::NoError => "no error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::Internal => "internal error",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::BadParameter => "bad parameter",
            ErrorKind::Conflict => "conflict",
            ErrorKind::DocumentNotFound => "document not found",
            ErrorKind::CollectionNotFound => "collection or view not found",
            ErrorKind::DocumentHandleBad => "illegal document handle",
            ErrorKind::UniqueConstraintViolated => "unique constraint violated",
            ErrorKind::IndexNotFound => "index not found",
            ErrorKind::IndexHandleBad => "illegal index handle",
            ErrorKind::CollectionTypeInvalid => "invalid collection type",
            ErrorKind::DocumentKeyBad => "illegal document key",
            ErrorKind::DocumentTypeInvalid => "invalid document type",
            ErrorKind::OnlyOnDbServer => "this operation is only valid on a database server",
            ErrorKind::TransactionInternal => "internal transaction error",
            ErrorKind::TransactionNested => "nested transactions detected",
        }
    }

    pub fn is_error(self) -> bool {
        self != ErrorKind::NoError
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (error {})", self.message(), self.code())
    }
}
