use std::fmt;

/// Owner/neighbour face-to-cell incidence of an unstructured mesh.
///
/// Every internal face connects exactly two cells: the `lower` (owner) and the
/// `upper` (neighbour) cell. The addressing is upper-triangular: for each face
/// `lower[f] < upper[f]`, and faces are sorted ascending by `(lower, upper)`.
/// This ordering is what makes plain face order a valid topological order for
/// the forward/backward substitution sweeps in the incomplete-factorization
/// preconditioners.
///
/// The addressing is immutable for the lifetime of the mesh; matrices hold it
/// behind an `Arc` and share it across multigrid levels of the same size.
pub struct LduAddressing {
    n_cells: usize,
    lower_addr: Vec<usize>,
    upper_addr: Vec<usize>,
    // faces grouped by owner cell, CSR-style offsets into face order
    owner_start: Vec<usize>,
    // face permutation grouped by neighbour cell, with offsets
    losort: Vec<usize>,
    losort_start: Vec<usize>,
}

impl LduAddressing {
    /// Validates the upper-triangular ordering invariants and precomputes the
    /// owner-grouped and neighbour-grouped face lookups.
    ///
    /// Panics on malformed input: this is a programming error in the caller,
    /// not a runtime condition.
    pub fn new(n_cells: usize, lower_addr: Vec<usize>, upper_addr: Vec<usize>) -> Self {
        if lower_addr.len() != upper_addr.len() {
            panic!(
                "owner/neighbour arrays differ in length: {} owners vs {} neighbours",
                lower_addr.len(),
                upper_addr.len()
            );
        }

        for (face, (&l, &u)) in lower_addr.iter().zip(upper_addr.iter()).enumerate() {
            if l >= u {
                panic!(
                    "face {} violates upper-triangular ordering: owner {} >= neighbour {}",
                    face, l, u
                );
            }
            if u >= n_cells {
                panic!(
                    "face {} references cell {} but the mesh has {} cells",
                    face, u, n_cells
                );
            }
            if face > 0 {
                let prev = (lower_addr[face - 1], upper_addr[face - 1]);
                if prev >= (l, u) {
                    panic!(
                        "faces {} and {} are not sorted ascending by (owner, neighbour): \
                         ({}, {}) then ({}, {})",
                        face - 1,
                        face,
                        prev.0,
                        prev.1,
                        l,
                        u
                    );
                }
            }
        }

        let n_faces = lower_addr.len();

        let mut owner_start = vec![0usize; n_cells + 1];
        for &l in &lower_addr {
            owner_start[l + 1] += 1;
        }
        for cell in 0..n_cells {
            owner_start[cell + 1] += owner_start[cell];
        }

        let mut losort_start = vec![0usize; n_cells + 1];
        for &u in &upper_addr {
            losort_start[u + 1] += 1;
        }
        for cell in 0..n_cells {
            losort_start[cell + 1] += losort_start[cell];
        }
        let mut fill = losort_start.clone();
        let mut losort = vec![0usize; n_faces];
        for (face, &u) in upper_addr.iter().enumerate() {
            losort[fill[u]] = face;
            fill[u] += 1;
        }

        Self {
            n_cells,
            lower_addr,
            upper_addr,
            owner_start,
            losort,
            losort_start,
        }
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.lower_addr.len()
    }

    /// Owner cell of each internal face.
    pub fn lower_addr(&self) -> &[usize] {
        &self.lower_addr
    }

    /// Neighbour cell of each internal face.
    pub fn upper_addr(&self) -> &[usize] {
        &self.upper_addr
    }

    /// Faces owned by `cell`, i.e. faces `f` with `lower_addr[f] == cell`.
    pub fn owner_faces(&self, cell: usize) -> std::ops::Range<usize> {
        self.owner_start[cell]..self.owner_start[cell + 1]
    }

    /// Faces neighbouring `cell` (as indices into the face order), i.e. faces
    /// `f` with `upper_addr[f] == cell`.
    pub fn neighbour_faces(&self, cell: usize) -> &[usize] {
        &self.losort[self.losort_start[cell]..self.losort_start[cell + 1]]
    }
}

impl fmt::Debug for LduAddressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LduAddressing {{ cells: {}, faces: {} }}",
            self.n_cells,
            self.n_faces()
        )
    }
}
