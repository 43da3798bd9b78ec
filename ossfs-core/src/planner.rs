//! Decomposition of a dirty file into multipart-upload parts
//!
//! The planner walks the file as alternating runs of dirty bytes (uploaded
//! from the local cache) and clean bytes (copied server-side from the
//! persisted object). Runs are then cut into parts that respect the store's
//! size floor for every part but the last, and its size ceiling for all.
//! Clean bytes are re-uploaded only where needed to lift a short dirty run
//! up to the floor.

use std::collections::VecDeque;

use crate::{ByteSource, CopySource, ObjectKey, PartJob, PartSource, PlanError, UntreatedRange};

/// Part size and count constraints of the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    /// Floor for every part except the last
    pub min_part_size: u64,
    /// Ceiling for every part
    pub max_part_size: u64,
    pub max_parts: u32,
    /// Whether clean ranges may be copied server-side instead of re-uploaded
    pub allow_copy: bool,
}

impl PartLimits {
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.min_part_size == 0 {
            return Err(PlanError::InvalidLimits("min_part_size must be positive".into()));
        }
        if self.max_part_size < self.min_part_size {
            return Err(PlanError::InvalidLimits(format!(
                "max_part_size {} below min_part_size {}",
                self.max_part_size, self.min_part_size
            )));
        }
        if self.max_parts == 0 {
            return Err(PlanError::InvalidLimits("max_parts must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Fresh bytes read from the local cache
    Upload,
    /// Bytes copied server-side from the persisted object
    Copy,
}

/// A part decided by the planner, not yet bound to a byte source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPart {
    pub part_number: u32,
    pub offset: u64,
    pub size: u64,
    pub kind: PartKind,
}

impl PlannedPart {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Attach the part to the bytes it reads. Copy parts reference `key`.
    pub fn bind<'a>(&self, source: ByteSource<'a>, key: &ObjectKey) -> PartJob<'a> {
        let source = match (self.kind, source) {
            (PartKind::Copy, _) => PartSource::Copy(CopySource {
                key: key.clone(),
                offset: self.offset,
                len: self.size,
            }),
            (PartKind::Upload, ByteSource::File(file)) => PartSource::File {
                file,
                offset: self.offset,
            },
            (PartKind::Upload, ByteSource::Buffer(data)) => PartSource::Buffer {
                data,
                cursor: self.offset as usize,
            },
        };

        PartJob {
            part_number: self.part_number,
            size: self.size,
            source,
        }
    }
}

/// Bind every planned part to the same source
pub fn bind_all<'a>(parts: &[PlannedPart], source: ByteSource<'a>, key: &ObjectKey) -> Vec<PartJob<'a>> {
    parts.iter().map(|p| p.bind(source, key)).collect()
}

/// Bytes that will be uploaded and bytes that will be copied, in that order
pub fn bytes_by_kind(parts: &[PlannedPart]) -> (u64, u64) {
    parts.iter().fold((0, 0), |(up, cp), p| match p.kind {
        PartKind::Upload => (up + p.size, cp),
        PartKind::Copy => (up, cp + p.size),
    })
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    kind: PartKind,
    start: u64,
    end: u64,
}

impl Segment {
    fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// Plan the parts that rebuild a `file_size`-byte object.
///
/// Part numbers are dense, 1-based and follow byte order.
pub fn plan(
    file_size: u64,
    untreated: &[UntreatedRange],
    limits: &PartLimits,
) -> Result<Vec<PlannedPart>, PlanError> {
    limits.validate()?;

    let mut segments = segments(file_size, untreated, limits.allow_copy);
    let mut parts: Vec<PlannedPart> = Vec::new();
    let mut emit = |kind: PartKind, start: u64, size: u64| {
        let part_number = parts.len() as u32 + 1;
        parts.push(PlannedPart {
            part_number,
            offset: start,
            size,
            kind,
        });
    };

    while let Some(mut seg) = segments.pop_front() {
        loop {
            let len = seg.len();
            if len > limits.max_part_size {
                emit(seg.kind, seg.start, limits.max_part_size);
                seg.start += limits.max_part_size;
                continue;
            }

            let next_is_last = segments.len() == 1;
            let Some(next) = segments.front_mut() else {
                // The last part may be any size
                emit(seg.kind, seg.start, len);
                break;
            };

            if len >= limits.min_part_size {
                emit(seg.kind, seg.start, len);
                break;
            }

            match seg.kind {
                PartKind::Copy => {
                    // Too short to stand alone: the following dirty run
                    // re-uploads it from the cache.
                    debug_assert_eq!(next.kind, PartKind::Upload);
                    next.start = seg.start;
                    break;
                }
                PartKind::Upload => {
                    debug_assert_eq!(next.kind, PartKind::Copy);
                    let need = limits.min_part_size - len;
                    let rest = next.len().saturating_sub(need);
                    if rest > 0 && (rest >= limits.min_part_size || next_is_last) {
                        seg.end += need;
                        next.start += need;
                        emit(seg.kind, seg.start, seg.len());
                        break;
                    }

                    // Borrowing would strand a clean tail below the floor;
                    // take the whole clean run and the dirty run after it.
                    if let Some(clean) = segments.pop_front() {
                        seg.end = clean.end;
                    }
                    if segments.front().is_some_and(|s| s.kind == PartKind::Upload) {
                        if let Some(dirty) = segments.pop_front() {
                            seg.end = dirty.end;
                        }
                    }
                }
            }
        }
    }

    if parts.len() > limits.max_parts as usize {
        return Err(PlanError::TooManyParts {
            needed: parts.len(),
            max: limits.max_parts,
        });
    }

    Ok(parts)
}

/// Split `[0, file_size)` into alternating dirty and clean runs.
fn segments(file_size: u64, untreated: &[UntreatedRange], allow_copy: bool) -> VecDeque<Segment> {
    let mut out = VecDeque::new();
    if file_size == 0 {
        return out;
    }
    if !allow_copy {
        push(&mut out, PartKind::Upload, 0, file_size);
        return out;
    }

    let mut dirty: Vec<(u64, u64)> = untreated
        .iter()
        .filter(|r| r.start < file_size)
        .map(|r| (r.start, r.end().min(file_size)))
        .collect();
    dirty.sort_unstable();

    let mut cursor = 0;
    for (start, end) in dirty {
        if end <= cursor {
            continue;
        }
        let start = start.max(cursor);
        if start > cursor {
            push(&mut out, PartKind::Copy, cursor, start);
        }
        push(&mut out, PartKind::Upload, start, end);
        cursor = end;
    }
    if cursor < file_size {
        push(&mut out, PartKind::Copy, cursor, file_size);
    }

    out
}

fn push(out: &mut VecDeque<Segment>, kind: PartKind, start: u64, end: u64) {
    if let Some(last) = out.back_mut() {
        if last.kind == kind && last.end == start {
            last.end = end;
            return;
        }
    }
    out.push_back(Segment { kind, start, end });
}
