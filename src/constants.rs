// src/constants.rs

/// The name of the serialized package-set manifest in a managed directory.
pub const SET_FILE: &str = "chimi.yaml";

/// Directory (relative to the runtime package source root) that holds
/// per-architecture build metadata.
pub const ARCH_DIR: &str = "src/arch";

/// Subdirectory of an application package that holds its builds.
pub const BUILDS_DIR: &str = "builds";

/// The sentinel architecture every base architecture inherits from.
pub const COMMON_ARCH: &str = "common";

/// Default communication transport used when probing an architecture for the
/// current host.
pub const DEFAULT_COMMS_TYPE: &str = "net";

/// Entries under the architecture directory that are not architectures:
/// version-control droppings, shared infrastructure, and retired platforms.
pub const ARCH_DENYLIST: &[&str] = &[
    "CVS",
    "shmem",
    "mpi",
    "sim",
    "net",
    "multicore",
    "util",
    "common",
    "uth",
    "conv-mach-fix.sh",
    "win32",
    "win64",
    "paragon",
    "lapi",
    "cell",
    "gemini_gni",
    "pami",
    "template",
    "cuda",
];

/// Compiler names that, when found among an architecture's option files,
/// are Fortran compilers rather than generic build options.
pub const FORTRAN_COMPILERS: &[&str] = &["g95", "gfortran", "absoft", "pgf90", "ifc", "ifort"];

/// Well-known names of the two managed packages.
pub const RUNTIME_PACKAGE: &str = "charm";
pub const APPLICATION_PACKAGE: &str = "changa";

/// Default clone URLs for the managed packages.
pub const RUNTIME_REPOSITORY: &str = "http://charm.cs.illinois.edu/gerrit/charm.git";
pub const APPLICATION_REPOSITORY: &str = "http://charm.cs.illinois.edu/gerrit/cosmo/changa";

/// Conventional CUDA toolkit locations probed when the `cuda` component is
/// enabled without an explicit directory setting.
pub const CUDA_CANDIDATE_DIRS: &[&str] = &["/usr/local/cuda", "/usr/lib/nvidia-cuda-toolkit"];
