fn main() {
    // Embed Windows version info
    #[cfg(windows)]
    {
        let mut res = winres::WindowsResource::new();
        res.set("ProductName", "TekDT AIS");
        res.set("FileDescription", "TekDT automatic software installer");
        res.set("CompanyName", "TekDT");
        res.set("LegalCopyright", "Copyright © 2024 TekDT");
        res.set("OriginalFilename", "tekdt-ais.exe");
        res.set("FileVersion", env!("CARGO_PKG_VERSION"));
        res.set("ProductVersion", env!("CARGO_PKG_VERSION"));
        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to embed Windows resources: {e}");
        }
    }
}
