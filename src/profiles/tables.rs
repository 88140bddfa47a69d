//! Built-in soname -> package tables

use std::collections::HashMap;

/// Sonames shipped by the same package on Fedora, CentOS Stream and RHEL
pub(super) const CORE_MAPPINGS: &[(&str, &str)] = &[
    // ==================== C RUNTIME ====================
    ("libc.so.6", "glibc"),
    ("libm.so.6", "glibc"),
    ("libdl.so.2", "glibc"),
    ("libpthread.so.0", "glibc"),
    ("librt.so.1", "glibc"),
    ("libutil.so.1", "glibc"),
    ("libresolv.so.2", "glibc"),
    ("libanl.so.1", "glibc"),
    ("ld-linux-x86-64.so.2", "glibc"),
    ("ld-linux-aarch64.so.1", "glibc"),
    ("ld-linux.so.2", "glibc"),
    ("libstdc++.so.6", "libstdc++"),
    ("libgcc_s.so.1", "libgcc"),
    ("libatomic.so.1", "libatomic"),
    ("libgomp.so.1", "libgomp"),
    ("libcrypt.so.2", "libxcrypt"),
    ("libcrypt.so.1", "libxcrypt"),

    // ==================== COMPRESSION ====================
    ("libz.so.1", "zlib"),
    ("libbz2.so.1", "bzip2-libs"),
    ("liblzma.so.5", "xz-libs"),
    ("libzstd.so.1", "libzstd"),
    ("liblz4.so.1", "lz4-libs"),

    // ==================== CORE LIBRARIES ====================
    ("libexpat.so.1", "expat"),
    ("libffi.so.8", "libffi"),
    ("libpcre2-8.so.0", "pcre2"),
    ("libuuid.so.1", "libuuid"),
    ("libblkid.so.1", "libblkid"),
    ("libmount.so.1", "libmount"),
    ("libselinux.so.1", "libselinux"),
    ("libcap.so.2", "libcap"),
    ("libudev.so.1", "systemd-libs"),
    ("libsystemd.so.0", "systemd-libs"),
    ("libdbus-1.so.3", "dbus-libs"),
    ("libsqlite3.so.0", "sqlite-libs"),
    ("libxml2.so.2", "libxml2"),
    ("libicuuc.so.67", "libicu"),
    ("libtinfo.so.6", "ncurses-libs"),
    ("libncursesw.so.6", "ncurses-libs"),
    ("libreadline.so.8", "readline"),

    // ==================== SSL/CRYPTO/NETWORK ====================
    ("libssl.so.3", "openssl-libs"),
    ("libcrypto.so.3", "openssl-libs"),
    ("libgnutls.so.30", "gnutls"),
    ("libgcrypt.so.20", "libgcrypt"),
    ("libgpg-error.so.0", "libgpg-error"),
    ("libnss3.so", "nss"),
    ("libnssutil3.so", "nss-util"),
    ("libsmime3.so", "nss"),
    ("libssl3.so", "nss"),
    ("libnspr4.so", "nspr"),
    ("libplc4.so", "nspr"),
    ("libplds4.so", "nspr"),
    ("libcurl.so.4", "libcurl"),
    ("libsecret-1.so.0", "libsecret"),
    ("libkrb5.so.3", "krb5-libs"),
    ("libgssapi_krb5.so.2", "krb5-libs"),
    ("libcups.so.2", "cups-libs"),
    ("libavahi-client.so.3", "avahi-libs"),
    ("libavahi-common.so.3", "avahi-libs"),

    // ==================== GLIB/GTK ====================
    ("libglib-2.0.so.0", "glib2"),
    ("libgobject-2.0.so.0", "glib2"),
    ("libgio-2.0.so.0", "glib2"),
    ("libgmodule-2.0.so.0", "glib2"),
    ("libgthread-2.0.so.0", "glib2"),
    ("libgtk-3.so.0", "gtk3"),
    ("libgdk-3.so.0", "gtk3"),
    ("libgtk-4.so.1", "gtk4"),
    ("libgdk_pixbuf-2.0.so.0", "gdk-pixbuf2"),
    ("libatk-1.0.so.0", "at-spi2-atk"),
    ("libatk-bridge-2.0.so.0", "at-spi2-atk"),
    ("libatspi.so.0", "at-spi2-core"),
    ("libpango-1.0.so.0", "pango"),
    ("libpangocairo-1.0.so.0", "pango"),
    ("libpangoft2-1.0.so.0", "pango"),
    ("libcairo.so.2", "cairo"),
    ("libcairo-gobject.so.2", "cairo-gobject"),
    ("libharfbuzz.so.0", "harfbuzz"),
    ("libfontconfig.so.1", "fontconfig"),
    ("libfreetype.so.6", "freetype"),
    ("libpixman-1.so.0", "pixman"),
    ("libpng16.so.16", "libpng"),
    ("libjpeg.so.62", "libjpeg-turbo"),
    ("libtiff.so.5", "libtiff"),
    ("libnotify.so.4", "libnotify"),

    // ==================== X11/WAYLAND ====================
    ("libX11.so.6", "libX11"),
    ("libX11-xcb.so.1", "libX11-xcb"),
    ("libXext.so.6", "libXext"),
    ("libXrender.so.1", "libXrender"),
    ("libXrandr.so.2", "libXrandr"),
    ("libXcomposite.so.1", "libXcomposite"),
    ("libXdamage.so.1", "libXdamage"),
    ("libXfixes.so.3", "libXfixes"),
    ("libXcursor.so.1", "libXcursor"),
    ("libXi.so.6", "libXi"),
    ("libXinerama.so.1", "libXinerama"),
    ("libXtst.so.6", "libXtst"),
    ("libXScrnSaver.so.1", "libXScrnSaver"),
    ("libXau.so.6", "libXau"),
    ("libXdmcp.so.6", "libXdmcp"),
    ("libSM.so.6", "libSM"),
    ("libICE.so.6", "libICE"),
    ("libxcb.so.1", "libxcb"),
    ("libxcb-shm.so.0", "libxcb"),
    ("libxcb-render.so.0", "libxcb"),
    ("libxcb-randr.so.0", "libxcb"),
    ("libxcb-xfixes.so.0", "libxcb"),
    ("libxcb-shape.so.0", "libxcb"),
    ("libxcb-sync.so.1", "libxcb"),
    ("libxcb-xkb.so.1", "libxcb"),
    ("libxcb-dri3.so.0", "libxcb"),
    ("libxcb-icccm.so.4", "xcb-util-wm"),
    ("libxcb-image.so.0", "xcb-util-image"),
    ("libxcb-keysyms.so.1", "xcb-util-keysyms"),
    ("libxcb-render-util.so.0", "xcb-util-renderutil"),
    ("libxkbcommon.so.0", "libxkbcommon"),
    ("libxkbcommon-x11.so.0", "libxkbcommon-x11"),
    ("libxshmfence.so.1", "libxshmfence"),
    ("libwayland-client.so.0", "libwayland-client"),
    ("libwayland-cursor.so.0", "libwayland-cursor"),
    ("libwayland-egl.so.1", "libwayland-egl"),
    ("libwayland-server.so.0", "libwayland-server"),

    // ==================== GRAPHICS ====================
    ("libGL.so.1", "libglvnd-glx"),
    ("libGLX.so.0", "libglvnd-glx"),
    ("libEGL.so.1", "libglvnd-egl"),
    ("libGLESv2.so.2", "libglvnd-gles"),
    ("libOpenGL.so.0", "libglvnd-opengl"),
    ("libgbm.so.1", "mesa-libgbm"),
    ("libdrm.so.2", "libdrm"),
    ("libvulkan.so.1", "vulkan-loader"),
    ("libepoxy.so.0", "libepoxy"),

    // ==================== AUDIO ====================
    ("libasound.so.2", "alsa-lib"),
    ("libpulse.so.0", "pulseaudio-libs"),
    ("libpulse-simple.so.0", "pulseaudio-libs"),

    // ==================== FUSE ====================
    ("libfuse.so.2", "fuse-libs"),
    ("libfuse3.so.3", "fuse3-libs"),
];

/// Sonames whose provider differs per profile.
/// `None` marks a soname with no provider in the base repositories.
pub(super) type Overrides = &'static [(&'static str, Option<&'static str>)];

/// Fedora: newest libraries, appindicator available in the base repos
pub(super) const FEDORA_OVERRIDES: Overrides = &[
    ("libappindicator3.so.1", Some("libappindicator-gtk3")),
    ("libayatana-appindicator3.so.1", Some("libayatana-appindicator-gtk3")),
    ("libicuuc.so.74", Some("libicu")),
    ("libicui18n.so.74", Some("libicu")),
    ("libwebkit2gtk-4.1.so.0", Some("webkit2gtk4.1")),
    ("libjavascriptcoregtk-4.1.so.0", Some("javascriptcoregtk4.1")),
    ("libsoup-3.0.so.0", Some("libsoup3")),
    ("libtiff.so.6", Some("libtiff")),
    ("libffi.so.8", Some("libffi")),
];

/// EL9 package set shared by CentOS Stream and RHEL
pub(super) const EL_OVERRIDES: Overrides = &[
    ("libappindicator3.so.1", None),
    ("libayatana-appindicator3.so.1", None),
    ("libgtk-4.so.1", Some("gtk4")),
    ("libtiff.so.5", Some("libtiff")),
    ("libwebkit2gtk-4.0.so.37", Some("webkit2gtk3")),
    ("libjavascriptcoregtk-4.0.so.18", Some("webkit2gtk3-jsc")),
    ("libsoup-2.4.so.1", Some("libsoup")),
    ("libicuuc.so.67", Some("libicu")),
    ("libicui18n.so.67", Some("libicu")),
];

/// Packages CentOS Stream carries in AppStream/CRB that RHEL lacks
pub(super) const RHEL_OVERRIDES: Overrides = &[
    ("libfuse3.so.3", None),
    ("libxcb-icccm.so.4", None),
    ("libxcb-image.so.0", None),
    ("libxcb-keysyms.so.1", None),
    ("libxcb-render-util.so.0", None),
];

/// Materialized table for one profile
#[derive(Debug, Clone)]
pub(super) struct SonameTable {
    entries: HashMap<&'static str, &'static str>,
}

impl SonameTable {
    /// Core table with each layer of overrides applied in order
    pub(super) fn with_overrides(layers: &[Overrides]) -> Self {
        let mut entries: HashMap<&'static str, &'static str> =
            CORE_MAPPINGS.iter().copied().collect();

        for (soname, package) in layers.iter().flat_map(|layer| layer.iter()) {
            match package {
                Some(package) => {
                    entries.insert(soname, package);
                }
                None => {
                    entries.remove(soname);
                }
            }
        }

        Self { entries }
    }

    pub(super) fn get(&self, soname: &str) -> Option<&'static str> {
        self.entries.get(soname).copied()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
