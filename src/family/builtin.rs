//! Built-in family data: formula lineage, event fix tables, C-state levels.

/// Spreadsheet columns to fall back on, most specific first.
pub const LINEAGE: &[(&str, &[&str])] = &[
    ("IVT", &["IVT", "IVB", "JKT/SNB-EP", "SNB"]),
    ("IVB", &["IVB", "SNB"]),
    ("HSW", &["HSW", "IVB", "SNB"]),
    ("HSX", &["HSX", "HSW", "IVT", "IVB", "JKT/SNB-EP", "SNB"]),
    ("BDW", &["BDW", "HSW", "IVB", "SNB"]),
    (
        "BDW-DE",
        &["BDW-DE", "BDX", "BDW", "HSX", "HSW", "IVT", "IVB", "JKT/SNB-EP", "SNB"],
    ),
    (
        "BDX",
        &["BDX", "BDW", "HSX", "HSW", "IVT", "IVB", "JKT/SNB-EP", "SNB"],
    ),
    ("SNB", &["SNB"]),
    ("JKT/SNB-EP", &["JKT/SNB-EP", "SNB"]),
    ("SKL/KBL", &["SKL/KBL", "BDW", "HSW", "IVB", "SNB"]),
    (
        "SKX",
        &[
            "SKX", "SKL/KBL", "BDX", "BDW", "HSX", "HSW", "IVT", "IVB", "JKT/SNB-EP", "SNB",
        ],
    ),
    ("KBLR/CFL", &["KBLR/CFL", "SKL/KBL", "BDW", "HSW", "IVB", "SNB"]),
    (
        "CLX",
        &[
            "CLX",
            "KBLR/CFL/CML",
            "SKX",
            "SKL/KBL",
            "BDX",
            "BDW",
            "HSX",
            "HSW",
            "IVT",
            "IVB",
            "JKT/SNB-EP",
            "SNB",
        ],
    ),
    (
        "ICL",
        &["ICL", "CNL", "KBLR/CFL/CML", "SKL/KBL", "BDW", "HSW", "IVB", "SNB"],
    ),
    (
        "ICX",
        &[
            "ICX",
            "ICL",
            "CNL",
            "CPX",
            "CLX",
            "KBLR/CFL/CML",
            "SKX",
            "SKL/KBL",
            "BDX",
            "BDW",
            "HSX",
            "HSW",
            "IVT",
            "IVB",
            "JKT/SNB-EP",
            "SNB",
        ],
    ),
    (
        "RKL",
        &[
            "RKL",
            "ICL",
            "CNL",
            "KBLR/CFL/CML",
            "SKL/KBL",
            "BDW/BDW-DE",
            "HSW",
            "IVB",
            "SNB",
        ],
    ),
    (
        "TGL",
        &[
            "TGL",
            "RKL",
            "ICL",
            "CNL",
            "KBLR/CFL/CML",
            "SKL/KBL",
            "BDW/BDW-DE",
            "HSW",
            "IVB",
            "SNB",
        ],
    ),
    (
        "ADL/RPL",
        &[
            "ADL/RPL",
            "TGL",
            "RKL",
            "ICL",
            "CNL",
            "KBLR/CFL/CML",
            "SKL/KBL",
            "BDW",
            "HSW",
            "IVB",
            "SNB",
        ],
    ),
    (
        "SPR",
        &[
            "SPR",
            "ADL/RPL",
            "TGL",
            "RKL",
            "ICX",
            "ICL",
            "CNL",
            "CPX",
            "CLX",
            "KBLR/CFL/CML",
            "SKX",
            "SKL/KBL",
            "BDX",
            "BDW",
            "HSX",
            "HSW",
            "IVT",
            "IVB",
            "JKT/SNB-EP",
            "SNB",
        ],
    ),
    ("GRT", &["GRT"]),
];

/// Core and package C-state levels, matched by family prefix.
pub const CSTATES: &[(&[&str], &[u8], &[u8])] = &[
    (&["NHM", "WSM"], &[3, 6], &[3, 6, 7]),
    (
        &[
            "SNB", "IVB", "HSW", "BDW", "BDX", "SKL", "SKX", "CLX", "CPX", "HSX", "IVT", "JKT",
        ],
        &[3, 6, 7],
        &[2, 3, 6, 7],
    ),
    (&["KBL"], &[3, 6, 7], &[2, 3, 6, 7]),
    (&["CNL"], &[1, 3, 6, 7], &[2, 3, 6, 7, 8, 9, 10]),
    (&["ICL", "TGL", "RKL"], &[6, 7], &[2, 3, 6, 7, 8, 9, 10]),
    (&["ICX", "SPR"], &[1, 6], &[2, 6]),
    (&["ADL", "GRT"], &[1, 6, 7], &[2, 3, 6, 7, 8, 9, 10]),
    (&["SLM"], &[1, 6], &[6]),
    (&["KNL", "KNM"], &[6], &[2, 3, 6]),
    (&["GLM", "SNR"], &[1, 3, 6], &[2, 3, 6, 10]),
];

/// Event fix tables keyed by family. Order matters: a more specific pattern
/// must precede any pattern that is its prefix.
pub const EVENT_FIXES: &[(&str, &[(&str, &str)])] = &[
    ("SPR", SPR_EVENT_FIXES),
    ("ICX", ICX_EVENT_FIXES),
];

const SPR_EVENT_FIXES: &[(&str, &str)] = &[
    ("UNC_CHA_CLOCKTICKS:one_unit", "uncore_cha_0@event=0x1@"),
    ("UNC_M_CLOCKTICKS:one_unit", "uncore_imc_0@event=0x1,umask=0x1@"),
    (
        "UNC_CHA_TOR_OCCUPANCY.IA_MISS_DRD:c1",
        "cha@UNC_CHA_TOR_OCCUPANCY.IA_MISS_DRD,thresh=1@",
    ),
    ("UNC_M_CAS_COUNT.RD", "uncore_imc@cas_count_read@"),
    ("UNC_M_CAS_COUNT.WR", "uncore_imc@cas_count_write@"),
];

const ICX_EVENT_FIXES: &[(&str, &str)] = &[
    ("UNC_CHA_CLOCKTICKS:one_unit", "cha_0@event=0x0@"),
    ("UNC_M_CLOCKTICKS:one_unit", "imc_0@event=0x0@"),
    (
        "UNC_CHA_TOR_OCCUPANCY.IA_MISS_DRD:c1",
        "cha@event=0x36,umask=0xC817FE01,thresh=1@",
    ),
    ("UNC_M_CAS_COUNT.RD", "uncore_imc@cas_count_read@"),
    ("UNC_M_CAS_COUNT.WR", "uncore_imc@cas_count_write@"),
    ("UNC_M_PMM_RPQ_INSERTS", "imc@event=0xe3@"),
    ("UNC_M_PMM_WPQ_INSERTS", "imc@event=0xe7@"),
    ("UOPS_RETIRED.RETIRE_SLOTS", "UOPS_RETIRED.SLOTS"),
];

/// Used by every family without its own table.
pub const DEFAULT_EVENT_FIXES: &[(&str, &str)] = &[
    (
        "L1D_PEND_MISS.PENDING_CYCLES,amt1",
        "cpu@l1d_pend_miss.pending_cycles,any=1@",
    ),
    ("MEM_LOAD_UOPS_RETIRED.HIT_LFB_PS", "mem_load_uops_retired.hit_lfb"),
    // SKX uncore
    ("UNC_M_CAS_COUNT.RD", "uncore_imc@cas_count_read@"),
    ("UNC_M_CAS_COUNT.WR", "uncore_imc@cas_count_write@"),
    (
        "UNC_CHA_TOR_OCCUPANCY.IA_MISS_DRD:c1",
        "cha@event=0x36,umask=0x21,config=0x40433,thresh=1@",
    ),
    (
        "UNC_CHA_TOR_OCCUPANCY.IA_MISS_DRD",
        "cha@event=0x36,umask=0x21,config=0x40433@",
    ),
    ("UNC_CHA_CLOCKTICKS:one_unit", "cha_0@event=0x0@"),
    (
        "UNC_CHA_TOR_INSERTS.IA_MISS_DRD",
        "cha@event=0x35,umask=0x21,config=0x40433@",
    ),
    ("UNC_M_PMM_RPQ_OCCUPANCY.ALL", "imc@event=0xe0,umask=0x1@"),
    ("UNC_M_PMM_RPQ_INSERTS", "imc@event=0xe3@"),
    ("UNC_M_PMM_WPQ_INSERTS", "imc@event=0xe7@"),
    ("UNC_M_CLOCKTICKS:one_unit", "imc_0@event=0x0@"),
    // SKL client uncore
    (
        "UNC_ARB_TRK_OCCUPANCY.DATA_READ:c1",
        "arb@event=0x80,umask=0x2,cmask=1@",
    ),
    ("UNC_ARB_TRK_OCCUPANCY.DATA_READ", "arb@event=0x80,umask=0x2@"),
    ("UNC_ARB_TRK_REQUESTS.ALL", "arb@event=0x81,umask=0x1@"),
    ("UNC_ARB_COH_TRK_REQUESTS.ALL", "arb@event=0x84,umask=0x1@"),
    // BDX uncore
    (
        "UNC_C_TOR_OCCUPANCY.MISS_OPCODE:opc=0x182:c1",
        "cbox@event=0x36,umask=0x3,filter_opc=0x182,thresh=1@",
    ),
    (
        "UNC_C_TOR_OCCUPANCY.MISS_OPCODE:opc=0x182",
        "cbox@event=0x36,umask=0x3,filter_opc=0x182@",
    ),
    (
        "UNC_C_TOR_INSERTS.MISS_OPCODE:opc=0x182:c1",
        "cbox@event=0x35,umask=0x3,filter_opc=0x182,thresh=1@",
    ),
    (
        "UNC_C_TOR_INSERTS.MISS_OPCODE:opc=0x182",
        "cbox@event=0x35,umask=0x3,filter_opc=0x182@",
    ),
    ("UNC_C_CLOCKTICKS:one_unit", "cbox_0@event=0x0@"),
];
