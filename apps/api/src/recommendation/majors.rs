/// Majors belonging to each category the recommendation model can predict.
pub const MAJOR_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Teknik",
        &[
            "Teknik Informatika",
            "Sistem Informasi",
            "Teknik Elektro",
            "Teknik Sipil",
            "Teknik Mesin",
            "Teknik Industri",
        ],
    ),
    (
        "Kesehatan",
        &[
            "Kedokteran",
            "Kedokteran Gigi",
            "Farmasi",
            "Keperawatan",
            "Kesehatan Masyarakat",
            "Gizi",
        ],
    ),
    (
        "Sains",
        &["Matematika", "Fisika", "Kimia", "Biologi", "Statistika"],
    ),
    (
        "Ekonomi dan Bisnis",
        &["Ekonomi", "Manajemen", "Akuntansi", "Bisnis Digital"],
    ),
    (
        "Sosial dan Humaniora",
        &[
            "Psikologi",
            "Ilmu Komunikasi",
            "Hubungan Internasional",
            "Sosiologi",
            "Sastra Inggris",
        ],
    ),
    ("Hukum", &["Hukum", "Ilmu Politik", "Administrasi Publik"]),
    (
        "Pendidikan",
        &[
            "Pendidikan Matematika",
            "Pendidikan Bahasa Inggris",
            "Pendidikan Guru Sekolah Dasar",
        ],
    ),
];

pub fn majors_for(category: &str) -> Option<&'static [&'static str]> {
    MAJOR_CATEGORIES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, majors)| *majors)
}

/// True iff `desired_major` is listed verbatim under `category`. Unknown
/// categories never match.
pub fn matches_desired_major(category: &str, desired_major: &str) -> bool {
    majors_for(category).is_some_and(|majors| majors.contains(&desired_major))
}
